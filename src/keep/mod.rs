pub mod audit;
pub mod batch;
pub mod config;
pub mod evaluate;
pub mod fetch;
pub mod layout;
pub mod ledger;
pub mod manifest;
pub mod normalize;
pub mod note;
pub mod paths;
pub mod reconcile;
pub mod util;
pub mod warn;
