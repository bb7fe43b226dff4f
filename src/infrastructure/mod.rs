pub mod db;
pub mod provider;
pub mod queue;
