//! Stanza parsing
//!
//! A line-driven state machine. Every line yields an event from its first
//! token, the event moves the machine to its next state, and the state
//! entered decides what the line contributes.

use crate::stanza::{Interfaces, Properties};
use std::collections::HashSet;

/// Key under which `allow-*` lines are stored verbatim
pub const ALLOW_KEY: &str = "allow-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    None,
    StartAuto,
    StartIface,
    ContinueIface,
    StandbyIface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Empty,
    NewAuto,
    NewIface,
    Reset,
    Continue,
}

impl Event {
    fn of(tokens: &[&str]) -> Self {
        match tokens.first() {
            None => Event::Empty,
            Some(first) if first.starts_with('#') => Event::Empty,
            Some(&"auto") => Event::NewAuto,
            Some(&"iface") if tokens.len() > 1 => Event::NewIface,
            Some(&"iface") => Event::Reset,
            Some(_) => Event::Continue,
        }
    }
}

impl State {
    /// Next state; events without a transition keep the current state
    fn next(self, event: Event) -> Self {
        match (self, event) {
            (State::None, Event::NewAuto) => State::StartAuto,
            (State::None, Event::NewIface) => State::StartIface,

            (State::ContinueIface, Event::NewAuto) => State::StartAuto,
            (State::ContinueIface, Event::NewIface) => State::StartIface,
            (State::ContinueIface, Event::Empty) => State::StandbyIface,
            (State::ContinueIface, Event::Reset) => State::None,

            (State::StandbyIface, Event::NewAuto) => State::StartAuto,
            (State::StandbyIface, Event::NewIface) => State::StartIface,
            (State::StandbyIface, Event::Continue) => State::ContinueIface,
            (State::StandbyIface, Event::Reset) => State::None,

            (state, _) => state,
        }
    }
}

/// Accumulating parser for the ifupdown stanza dialect
///
/// Several files can be fed into one parser; the auto list is a
/// deduplicated append across all of them.
#[derive(Debug)]
pub struct StanzaParser {
    auto: Vec<String>,
    seen_auto: HashSet<String>,
    ifaces: Interfaces,
    current: Option<String>,
    state: State,
}

impl Default for StanzaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StanzaParser {
    pub fn new() -> Self {
        Self {
            auto: Vec::new(),
            seen_auto: HashSet::new(),
            ifaces: Interfaces::new(),
            current: None,
            state: State::None,
        }
    }

    /// Parse a whole text in one go
    pub fn parse_str(content: &str) -> (Vec<String>, Interfaces) {
        let mut parser = Self::new();
        parser.parse_lines(content.lines());
        parser.finish()
    }

    /// Feed lines into the parser
    pub fn parse_lines<'a, I>(&mut self, lines: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for line in lines {
            self.parse_line(line.trim());
        }
        self.state = State::None;
    }

    /// Ordered auto list and parsed interfaces
    pub fn finish(self) -> (Vec<String>, Interfaces) {
        (self.auto, self.ifaces)
    }

    fn parse_line(&mut self, line: &str) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        self.state = self.state.next(Event::of(&tokens));

        match self.state {
            State::StartAuto => {
                for iface in &tokens[1..] {
                    if self.seen_auto.insert(iface.to_string()) {
                        self.auto.push(iface.to_string());
                    }
                }
                self.state = State::None;
            }
            State::StartIface => {
                let name = tokens[1].to_string();
                self.ifaces.entry(name.clone()).or_insert_with(|| {
                    let mut props = Properties::new();
                    props.insert(tokens[0].to_string(), Some(tokens[1..].join(" ")));
                    props
                });
                self.current = Some(name);
                self.state = State::ContinueIface;
            }
            State::ContinueIface => self.record_property(&tokens),
            State::None | State::StandbyIface => {}
        }
    }

    fn record_property(&mut self, tokens: &[&str]) {
        let Some(props) = self
            .current
            .as_ref()
            .and_then(|name| self.ifaces.get_mut(name))
        else {
            return;
        };

        if tokens[0].contains(ALLOW_KEY) {
            props.insert(ALLOW_KEY.to_string(), Some(tokens.join(" ")));
        } else if tokens.len() > 1 {
            props.insert(tokens[0].to_string(), Some(tokens[1..].join(" ")));
        } else {
            props.insert(tokens[0].to_string(), None);
        }
    }
}
