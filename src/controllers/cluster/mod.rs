pub mod controller;
pub mod reconcilers;
pub mod registry;
pub mod remote;
