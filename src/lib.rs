pub mod config;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod fleet;
pub mod output;
pub mod parser;
pub mod publisher;
pub mod query;
pub mod reference;
pub mod sanitize;
pub mod snapshot;
pub mod stats;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
