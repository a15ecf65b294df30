//! gnmilite engine: resolves wire paths against a [`Device`], serves Get and
//! ordered Set, and runs subscriptions with heartbeat/on-change gating.
//!
//! [`Device`]: gnmilite_core::tree::Device

mod driver;
mod error;
mod get;
mod manage;
mod select;
mod set;
mod subscribe;

pub use driver::Driver;
pub use error::{GnmiError, Result};
pub use get::{get, get_val};
pub use manage::{
    add_management_module, management_module, ServerControl, ServerOptions, MANAGEMENT_MODULE,
};
pub use select::{advance_selection, select_full_path, select_path};
pub use set::set;
pub use subscribe::{
    handle_subscribe_list, RecurringSubscription, Subscription, SubscriptionManager,
    SubscriptionSink, MIN_SAMPLE_INTERVAL,
};
