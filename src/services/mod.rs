//! Business logic services
//!
//! This module contains the reader logic separated from hardware concerns.
//! Services only talk to peripherals through traits, so they can be
//! exercised on the host with in-memory doubles.

pub mod address;
pub mod card_event;
pub mod command;
pub mod config_store;
pub mod feedback;
pub mod network;
pub mod response;
