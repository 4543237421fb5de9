// ABOUTME: Library module for mysql-pg-migrator
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod migration;
pub mod mysql;
pub mod postgres;
pub mod utils;
