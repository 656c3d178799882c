//! Same-day conversation memory appended to the persona prompt.

use chrono::{Local, NaiveDate};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub speaker: Speaker,
    pub text: String,
}

/// Last `limit` messages of today's chat. Forgets everything when the local date changes.
#[derive(Debug)]
pub struct ConversationHistory {
    limit: usize,
    day: NaiveDate,
    messages: VecDeque<HistoryMessage>,
}

impl ConversationHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            day: Local::now().date_naive(),
            messages: VecDeque::with_capacity(limit),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> impl Iterator<Item = &HistoryMessage> {
        self.messages.iter()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Records one completed exchange.
    pub fn record(&mut self, user_text: &str, reply: &str) {
        self.record_on(Local::now().date_naive(), user_text, reply);
    }

    /// `base` followed by today's messages, if any.
    pub fn contextualize(&mut self, base: &str) -> String {
        self.contextualize_on(Local::now().date_naive(), base)
    }

    fn roll_to(&mut self, today: NaiveDate) {
        if today != self.day {
            tracing::debug!(
                target: "chatpet::session",
                dropped = self.messages.len(),
                "New day; clearing conversation history"
            );
            self.day = today;
            self.messages.clear();
        }
    }

    fn push(&mut self, speaker: Speaker, text: &str) {
        if self.limit == 0 {
            return;
        }
        self.messages.push_back(HistoryMessage {
            speaker,
            text: text.to_string(),
        });
        while self.messages.len() > self.limit {
            self.messages.pop_front();
        }
    }

    fn record_on(&mut self, today: NaiveDate, user_text: &str, reply: &str) {
        self.roll_to(today);
        self.push(Speaker::User, user_text);
        self.push(Speaker::Assistant, reply);
    }

    fn contextualize_on(&mut self, today: NaiveDate, base: &str) -> String {
        self.roll_to(today);
        if self.messages.is_empty() {
            return base.to_string();
        }
        let mut out = String::with_capacity(base.len() + 64 * self.messages.len());
        out.push_str(base);
        out.push_str("\n\nPrevious conversation today:\n");
        for msg in &self.messages {
            let who = match msg.speaker {
                Speaker::User => "User",
                Speaker::Assistant => "Assistant",
            };
            out.push_str(who);
            out.push_str(": ");
            out.push_str(&msg.text);
            out.push('\n');
        }
        out
    }
}
