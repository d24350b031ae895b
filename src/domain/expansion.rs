//! Variant expansion
//!
//! Pure function from a [`ProductConfig`] to the purchasable variants it
//! describes. Every salable variant-id either becomes a [`Variant`] or a
//! [`DroppedVariant`] carrying the reason; nothing here fails the item.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::product_config::ProductConfig;

lazy_static! {
    /// Price add-on appended to option labels, e.g. `Foil +kr 12,00`.
    static ref PRICE_ADD_ON: Regex = Regex::new(r"\s+\+kr\s+\d+,\d+").expect("price add-on pattern is valid");
}

/// Default attribute ids of the target shop
pub mod defaults {
    pub const EDITION_ATTRIBUTE_ID: &str = "471";
    pub const NUMBER_ATTRIBUTE_ID: &str = "479";
    pub const SURFACE_ATTRIBUTE_ID: &str = "473";
}

/// Which attribute ids carry edition, collector number and surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeRoles {
    pub edition: String,
    pub number: String,
    pub surface: String,
}

impl Default for AttributeRoles {
    fn default() -> Self {
        Self {
            edition: defaults::EDITION_ATTRIBUTE_ID.to_string(),
            number: defaults::NUMBER_ATTRIBUTE_ID.to_string(),
            surface: defaults::SURFACE_ATTRIBUTE_ID.to_string(),
        }
    }
}

impl AttributeRoles {
    fn attribute_id(&self, role: AttributeRole) -> &str {
        match role {
            AttributeRole::Edition => &self.edition,
            AttributeRole::Number => &self.number,
            AttributeRole::Surface => &self.surface,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeRole {
    Edition,
    Number,
    Surface,
}

impl fmt::Display for AttributeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Edition => "edition",
            Self::Number => "number",
            Self::Surface => "surface",
        };
        f.write_str(name)
    }
}

/// A purchasable combination with its resolved labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub variant_id: String,
    pub sku: Option<String>,
    pub edition: String,
    pub number: String,
    pub surface: String,
    pub price: f64,
    /// Raw gallery HTML; the image address is extracted by the catalog parser
    pub gallery_fragment: Option<String>,
}

/// Why a salable variant-id did not become a [`Variant`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantDrop {
    /// The variant-id has no entry in the index
    NoIndexEntry,
    /// The index entry lacks the attribute, or its option has no label
    MissingAttribute {
        role: AttributeRole,
        attribute_id: String,
        option_id: Option<String>,
    },
    MissingPrice,
}

impl fmt::Display for VariantDrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoIndexEntry => f.write_str("variant has no index entry"),
            Self::MissingAttribute {
                role,
                attribute_id,
                option_id: None,
            } => write!(f, "{role} attribute {attribute_id} missing from index entry"),
            Self::MissingAttribute {
                role,
                attribute_id,
                option_id: Some(option_id),
            } => write!(
                f,
                "{role} option {option_id} of attribute {attribute_id} has no label"
            ),
            Self::MissingPrice => f.write_str("variant has no final price"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedVariant {
    pub variant_id: String,
    pub reason: VariantDrop,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    pub variants: Vec<Variant>,
    pub dropped: Vec<DroppedVariant>,
}

/// Expand every salable variant of `config`, in variant-id order.
#[must_use]
pub fn expand_variants(config: &ProductConfig, roles: &AttributeRoles) -> Expansion {
    let mut expansion = Expansion::default();

    for variant_id in config.salable_variant_ids() {
        match expand_one(config, roles, variant_id) {
            Ok(variant) => expansion.variants.push(variant),
            Err(reason) => expansion.dropped.push(DroppedVariant {
                variant_id: variant_id.to_string(),
                reason,
            }),
        }
    }

    expansion
}

fn expand_one(
    config: &ProductConfig,
    roles: &AttributeRoles,
    variant_id: &str,
) -> Result<Variant, VariantDrop> {
    let entry = config
        .index
        .get(variant_id)
        .ok_or(VariantDrop::NoIndexEntry)?;

    let resolve = |role: AttributeRole| -> Result<String, VariantDrop> {
        let attribute_id = roles.attribute_id(role);
        let option_id = entry
            .get(attribute_id)
            .ok_or_else(|| VariantDrop::MissingAttribute {
                role,
                attribute_id: attribute_id.to_string(),
                option_id: None,
            })?;
        config
            .option_label(attribute_id, option_id)
            .map(clean_option_label)
            .ok_or_else(|| VariantDrop::MissingAttribute {
                role,
                attribute_id: attribute_id.to_string(),
                option_id: Some(option_id.clone()),
            })
    };

    let edition = resolve(AttributeRole::Edition)?;
    let number = resolve(AttributeRole::Number)?;
    let surface = resolve(AttributeRole::Surface)?;

    let price = config
        .final_price(variant_id)
        .ok_or(VariantDrop::MissingPrice)?;

    Ok(Variant {
        variant_id: variant_id.to_string(),
        sku: config.sku(variant_id).map(str::to_string),
        edition,
        number,
        surface,
        price,
        gallery_fragment: config.gallery_fragment(variant_id).map(str::to_string),
    })
}

/// Strip the price add-on suffix from an option label.
#[must_use]
pub fn clean_option_label(label: &str) -> String {
    PRICE_ADD_ON.replace_all(label, "").trim().to_string()
}
