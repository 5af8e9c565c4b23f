pub mod budget;
pub mod classify;
pub mod feed;
pub mod geo;
pub mod geocoder;
pub mod gpx;
pub mod prompt;
pub mod reconcile;
pub mod simplify;
pub mod store;
pub mod sync;
pub mod upload;
