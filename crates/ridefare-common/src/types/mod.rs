pub mod config;
pub mod fare;
pub mod geo;
pub mod modifiers;
pub mod money;
pub mod resolved;
pub mod scope;
pub mod version;
