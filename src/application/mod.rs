pub mod bootstrap;
pub mod calendar_reader;
pub mod calendar_writer;
pub mod commands;
pub mod oauth;
pub mod prompt;
pub mod schedule_generator;
pub mod workflow;
