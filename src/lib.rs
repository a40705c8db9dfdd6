//! Ward-level housing affordability from raw listings, ward boundaries and
//! ward income.
//!
//! The core is four table-to-table stages: [`infer`] picks the ward id field
//! of the boundary data, [`assign`] places listings in wards, [`aggregate`]
//! summarises each ward and [`afford`] joins income and bands the ratio.
//! [`pipeline::run`] chains the last three.

pub mod afford;
pub mod aggregate;
pub mod assign;
pub mod error;
pub mod infer;
pub mod io;
pub mod names;
pub mod pipeline;
pub mod records;
pub mod render;
pub mod wards;

pub use error::SchemaError;
