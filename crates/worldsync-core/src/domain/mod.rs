//! Domain entities for the worldsync simulation mirror.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies: it can be compiled and tested without a socket in sight.
//! The core concepts are the two-sided identifier space (local ids assigned
//! eagerly by this process, server ids learned from creation replies), the
//! triple-indexed [`registry::Registry`], and the [`world::World`] /
//! [`model::Model`] object tree with its opaque property maps.

pub mod ids;
pub mod model;
pub mod property;
pub mod registry;
pub mod token;
pub mod world;
