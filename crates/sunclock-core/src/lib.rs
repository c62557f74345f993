//! # Sunclock Core Library
//!
//! Event time engine and dynamic scheduler for automation flows: resolves
//! symbolic time references ("sunset - 15 min on weekdays", "next
//! moonrise", "the last Friday of the month") against a configured
//! location, and drives schedules and time windows that re-arm themselves
//! as those references move.
//!
//! ## Architecture
//!
//! - **Ephemeris**: astronomical math sits behind [`EphemerisPort`]; the
//!   crate never computes sun or moon positions itself
//! - **Engine**: one [`Engine`] per location owns the day cache, the clock
//!   and the output settings, and is shared as `Arc<Engine>`
//! - **Resolver**: [`TimeQuery`] in, [`ResolvedTime`] out; recoverable
//!   failures travel on the result instead of as `Err`
//! - **Scheduler**: [`Schedule`] is a tick-driven state machine;
//!   [`ScheduleHandle`] runs one on tokio
//! - **Windows**: [`WindowSwitch`] routes messages by whether "now" lies
//!   between two resolved times of day
//! - **Storage**: TOML configuration under `~/.config/sunclock/`
//!
//! ## Key Components
//!
//! - [`Engine`]: shared resolution context
//! - [`Config`]: location, output and schedule configuration
//! - [`Schedule`]: primary/alternate timer with safety re-arm
//! - [`WindowSwitch`]: inside/outside router

pub mod astro;
pub mod cache;
pub mod calendar;
pub mod clock;
pub mod compare;
pub mod config;
pub mod engine;
pub mod ephemeris;
pub mod error;
pub mod events;
pub mod format;
pub mod locator;
pub mod property;
pub mod query;
pub mod resolver;
pub mod scheduler;
pub mod testing;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use compare::{CompareOp, Selector};
pub use config::Config;
pub use engine::Engine;
pub use ephemeris::{Body, Coordinates, EphemerisPort, EventRecord, EventSet};
pub use error::{ConfigError, CoreError, PropertyError, ResolutionError};
pub use events::ScheduleEvent;
pub use format::{OutputFormat, OutputSettings};
pub use locator::SurroundingEvents;
pub use property::{PropertyContext, PropertySource};
pub use query::{QueryRequest, QueryResponse};
pub use resolver::{ResolvedTime, TimeQuery, TimeReference};
pub use scheduler::{
    Alternate, Schedule, ScheduleHandle, ScheduleSpec, ScheduleState, ScheduleStatus,
    SchedulerConfig, Side,
};
pub use window::{WindowEvent, WindowHandle, WindowSpec, WindowSwitch};
