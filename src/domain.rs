//! Domain layer
//!
//! Plain data types for the catalog and the pure logic that turns a product
//! configuration into variants. Nothing here performs I/O.

pub mod catalog;
pub mod expansion;
pub mod product_config;

pub use catalog::{ItemRef, PageRef, StockRecord, VariantRecord};
pub use expansion::{AttributeRole, AttributeRoles, DroppedVariant, Expansion, Variant, VariantDrop, expand_variants};
pub use product_config::{PayloadError, ProductConfig};
