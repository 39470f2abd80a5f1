//! An in-memory campaign targeting engine for ad and content delivery.
//!
//! # Overview
//!
//! The engine revolves around a [`TargetingEngine`] that answers which active campaigns are
//! eligible for a [`DeliveryRequest`], described by the requesting application, country, and
//! operating system. Each campaign carries zero or more [`TargetingRule`]s with include and
//! exclude lists per dimension. A campaign without rules is eligible everywhere; otherwise at least
//! one of its rules has to match.
//!
//! Campaigns and rules come from a [`CampaignSource`] (such as the bundled [`MemorySource`]) and
//! are served from an immutable [`Snapshot`] that is replaced as a whole on every refresh. Results
//! are memoized per normalized request in a bounded LRU cache that is dropped on every successful
//! refresh.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! [`Error::is_client_error`] separates invalid requests from source failures. A failed refresh
//! never disturbs request serving: the previous snapshot stays active until a refresh succeeds.
//! A request no campaign matches is not an error and yields an empty list.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages under
//! the `targeting` target. Consider integrating a `log`-compatible logger implementation for better
//! visibility into refreshes.
//!
//! # Examples
//!
//! A runnable example can be found in the `demos/simple` directory of the crate repository.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod matcher;
mod model;
mod poller_thread;
mod refresher;
mod result_cache;
mod snapshot;
mod source;

pub use config::EngineConfig;
pub use engine::{Stats, TargetingEngine};
pub use error::{Error, Result};
pub use matcher::{CaseSensitivity, MatchOptions};
pub use model::{
    Campaign, CampaignStatus, DeliveryRequest, DeliveryResponse, NormalizedRequest, RequestField,
    TargetingRule, TryParse,
};
pub use poller_thread::{PollerThread, PollerThreadConfig};
pub use result_cache::{CachedResult, ResultCache};
pub use snapshot::{Snapshot, SnapshotStore};
pub use source::{CampaignSource, MemorySource, SourceDocument};
