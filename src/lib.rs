//! # Data Sweeper
//!
//! Upload CSV and Excel files, inspect them, clean them and convert between the two formats.
//!
//! ## Features
//!
//! - **Multi-file uploads**: `.csv` and `.xlsx` files, each handled independently
//! - **Type inference**: Boolean, BigInt, Double, Varchar, Date, Time and Timestamp columns
//! - **Cleaning**: remove duplicate rows and fill missing numeric values with the column mean
//! - **Column selection**: keep a subset of columns in the order chosen
//! - **Visualization**: bar chart data for the first two numeric columns
//! - **Conversion**: export the result as CSV or a single-sheet XLSX workbook
//!
//! The [`session`] module holds the per-file state machine; [`server`] exposes it over HTTP
//! and the `data-sweeper` binary also offers a batch `convert` command.
pub mod chart;
pub mod cleaning;
pub mod config;
pub mod error;
pub mod export;
pub(crate) mod helpers;
pub mod server;
pub mod session;
pub mod spreadsheet;
pub mod table;

pub use error::SweeperError;
