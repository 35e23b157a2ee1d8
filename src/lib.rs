pub mod agent;
pub mod error;
pub mod options;
pub mod replay;
pub mod script;
pub mod selection;
