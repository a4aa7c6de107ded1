//! # WiFi Bridge Library
//!
//! The co-processor side of the serial link between a main controller and
//! its WiFi co-processor.
//!
//! This library provides the frame codec, the link state machine with its
//! readiness handshake, the UDP tunnel and the outbound multiplexer, plus
//! a serial transport and host-side collaborators for running it on Linux.

pub mod collab;
pub mod config;
pub mod error;
pub mod host;
pub mod link;
pub mod serial;
pub mod wire;
