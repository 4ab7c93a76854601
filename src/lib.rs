//! NFSv4.1 client open-state lifecycle engine: the OPEN/CLOSE driver pair,
//! stateid selection, and the collaborator contracts (RPC, delegation
//! registry, layout return, id mapping) those drivers run against.

pub mod cancel;
pub mod client;
pub mod close_driver;
pub mod config;
pub mod delegation;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod mapper;
pub mod nfs_rpc;
pub mod open_driver;
pub mod open_state;
pub mod owner;
pub mod path;
pub mod state_ref;
pub mod stateid;
pub mod stateid_selector;
