// Public API - the runner module plus the defaults the CLI shares with it
pub mod config;
pub mod runner;

// Internal modules - organized by pipeline stage
mod db;
mod error;
mod export;
mod publish;
mod telemetry;
