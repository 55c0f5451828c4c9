pub mod catalog;
pub mod columns;
pub mod config;
pub mod controller;
pub mod listener;
pub mod notifier;
pub mod relation;
pub mod request_line;
pub mod rows;
