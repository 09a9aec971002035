//! User feedback (buzzer + optional RGB indicator)
//!
//! Feedback patterns are short step sequences played by [`FeedbackPlayer`],
//! which is advanced by the main loop tick instead of sleeping. Card polling,
//! console input and socket reads keep being serviced while a pattern plays.
//! A newly requested pattern interrupts the one playing, so an outcome is
//! always signalled as soon as it is known.
//!
//! Three outcome patterns must stay distinguishable:
//! - success: one short tone, green flash
//! - failure: two short tones, red flash
//! - connection failure: one long tone, blue flash

use log::debug;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use std::time::{Duration, Instant};

pub const SHORT_TONE_MS: u64 = 250;
pub const LONG_TONE_MS: u64 = 750;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    Idle,
    Green,
    Red,
    Blue,
}

impl Color {
    pub fn rgb(self) -> Rgb {
        match self {
            Color::Idle => Rgb(16, 16, 16),
            Color::Green => Rgb(0, 255, 0),
            Color::Red => Rgb(255, 0, 0),
            Color::Blue => Rgb(0, 0, 255),
        }
    }
}

#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait Buzzer {
    fn tone(&mut self, frequency_hz: u32);
    fn no_tone(&mut self);
}

#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait Indicator {
    fn set_color(&mut self, rgb: Rgb);
}

/// Capability set used to render feedback
pub trait FeedbackSink {
    fn set_tone(&mut self, on: bool);
    fn set_color(&mut self, color: Color);
}

/// Buzzer only; colors are dropped
pub struct ToneOnly<B> {
    buzzer: B,
    frequency_hz: u32,
}

impl<B: Buzzer> ToneOnly<B> {
    pub fn new(buzzer: B, frequency_hz: u32) -> Self {
        Self {
            buzzer,
            frequency_hz,
        }
    }
}

impl<B: Buzzer> FeedbackSink for ToneOnly<B> {
    fn set_tone(&mut self, on: bool) {
        if on {
            self.buzzer.tone(self.frequency_hz);
        } else {
            self.buzzer.no_tone();
        }
    }

    fn set_color(&mut self, _color: Color) {}
}

/// Buzzer plus RGB indicator
pub struct ToneAndColor<B, I> {
    tone: ToneOnly<B>,
    indicator: I,
}

impl<B: Buzzer, I: Indicator> ToneAndColor<B, I> {
    pub fn new(buzzer: B, indicator: I, frequency_hz: u32) -> Self {
        Self {
            tone: ToneOnly::new(buzzer, frequency_hz),
            indicator,
        }
    }
}

impl<B: Buzzer, I: Indicator> FeedbackSink for ToneAndColor<B, I> {
    fn set_tone(&mut self, on: bool) {
        self.tone.set_tone(on);
    }

    fn set_color(&mut self, color: Color) {
        self.indicator.set_color(color.rgb());
    }
}

impl<T: FeedbackSink + ?Sized> FeedbackSink for Box<T> {
    fn set_tone(&mut self, on: bool) {
        (**self).set_tone(on);
    }

    fn set_color(&mut self, color: Color) {
        (**self).set_color(color);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pattern {
    Startup,
    Success,
    Failure,
    ConnectFailed,
}

#[derive(Clone, Copy, Debug)]
struct Step {
    tone: bool,
    color: Option<Color>,
    duration_ms: u64,
}

const STEPS_STARTUP: &[Step] = &[Step {
    tone: true,
    color: None,
    duration_ms: SHORT_TONE_MS,
}];

const STEPS_SUCCESS: &[Step] = &[Step {
    tone: true,
    color: Some(Color::Green),
    duration_ms: SHORT_TONE_MS,
}];

const STEPS_FAILURE: &[Step] = &[
    Step {
        tone: true,
        color: Some(Color::Red),
        duration_ms: SHORT_TONE_MS,
    },
    Step {
        tone: false,
        color: None,
        duration_ms: SHORT_TONE_MS,
    },
    Step {
        tone: true,
        color: None,
        duration_ms: SHORT_TONE_MS,
    },
];

const STEPS_CONNECT_FAILED: &[Step] = &[Step {
    tone: true,
    color: Some(Color::Blue),
    duration_ms: LONG_TONE_MS,
}];

impl Pattern {
    fn steps(self) -> &'static [Step] {
        match self {
            Pattern::Startup => STEPS_STARTUP,
            Pattern::Success => STEPS_SUCCESS,
            Pattern::Failure => STEPS_FAILURE,
            Pattern::ConnectFailed => STEPS_CONNECT_FAILED,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Active {
    pattern: Pattern,
    step_index: usize,
    step_deadline: Instant,
}

/// Plays one pattern at a time, one step per deadline
pub struct FeedbackPlayer<F> {
    sink: F,
    active: Option<Active>,
}

impl<F: FeedbackSink> FeedbackPlayer<F> {
    pub fn new(mut sink: F) -> Self {
        sink.set_tone(false);
        sink.set_color(Color::Idle);

        Self { sink, active: None }
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Start a pattern now, cutting short whatever is playing
    pub fn play(&mut self, pattern: Pattern, now: Instant) {
        if let Some(active) = self.active.take() {
            debug!("feedback {:?} superseded by {pattern:?}", active.pattern);
            self.sink.set_tone(false);
            self.sink.set_color(Color::Idle);
        } else {
            debug!("feedback {pattern:?}");
        }

        self.enter_step(pattern, 0, now);
    }

    /// Advance the active pattern; call once per loop iteration
    pub fn tick(&mut self, now: Instant) {
        while let Some(active) = self.active {
            if now < active.step_deadline {
                return;
            }

            let next = active.step_index + 1;
            if next < active.pattern.steps().len() {
                self.enter_step(active.pattern, next, now);
            } else {
                self.sink.set_tone(false);
                self.sink.set_color(Color::Idle);
                self.active = None;
            }
        }
    }

    fn enter_step(&mut self, pattern: Pattern, step_index: usize, now: Instant) {
        let step = pattern.steps()[step_index];

        self.sink.set_tone(step.tone);
        if let Some(color) = step.color {
            self.sink.set_color(color);
        }

        self.active = Some(Active {
            pattern,
            step_index,
            step_deadline: now + Duration::from_millis(step.duration_ms),
        });
    }
}
