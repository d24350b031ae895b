//! Embedded product configuration payload
//!
//! Item pages carry several `text/x-magento-init` script payloads. Exactly one
//! of them (when present) holds the configurable-product definition under
//! `#product_addtocart_form.configurable.spConfig`. Every map is a
//! `BTreeMap` so iteration, and therefore variant expansion, is ordered.
//!
//! The shop serializes empty PHP arrays as `[]` rather than `{}`, so every
//! map accepts an empty JSON array as an empty map.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::{self, IgnoredAny};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::trace;

/// Payload decoding errors
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("payload is not a product configuration: {0}")]
    Schema(#[from] serde_json::Error),
}

/// `{ "#product_addtocart_form": { "configurable": { "spConfig": ... } } }`
#[derive(Debug, Clone, Deserialize)]
struct InitPayload {
    #[serde(rename = "#product_addtocart_form")]
    add_to_cart_form: AddToCartForm,
}

#[derive(Debug, Clone, Deserialize)]
struct AddToCartForm {
    configurable: Configurable,
}

#[derive(Debug, Clone, Deserialize)]
struct Configurable {
    #[serde(rename = "spConfig")]
    sp_config: ProductConfig,
}

/// Validated configuration of one catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductConfig {
    #[serde(rename = "productId")]
    pub product_id: String,

    /// attribute-id -> attribute definition
    #[serde(deserialize_with = "map_or_empty")]
    pub attributes: BTreeMap<String, Attribute>,

    /// variant-id -> prices
    #[serde(rename = "optionPrices", deserialize_with = "map_or_empty")]
    pub option_prices: BTreeMap<String, OptionPrices>,

    /// variant-id -> (attribute-id -> option-id)
    #[serde(deserialize_with = "map_or_empty")]
    pub index: BTreeMap<String, BTreeMap<String, String>>,

    /// attribute-id -> option-id -> [variant-id]
    #[serde(deserialize_with = "map_or_empty")]
    pub salable: BTreeMap<String, BTreeMap<String, Vec<String>>>,

    pub magictoolbox: MagicToolbox,

    /// variant-id -> sku
    #[serde(default, deserialize_with = "map_or_empty")]
    pub sku: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: String,
    pub code: String,
    pub label: String,
    pub options: Vec<AttributeOption>,
    #[serde(default)]
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeOption {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub products: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionPrices {
    #[serde(rename = "finalPrice")]
    pub final_price: PriceAmount,
    #[serde(rename = "basePrice", default)]
    pub base_price: Option<PriceAmount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceAmount {
    pub amount: f64,
}

/// Gallery extension data; one HTML fragment per variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicToolbox {
    #[serde(rename = "galleryData", deserialize_with = "map_or_empty")]
    pub gallery_data: BTreeMap<String, String>,
}

impl ProductConfig {
    /// Decode one script payload.
    pub fn from_payload(raw: &str) -> Result<Self, PayloadError> {
        let payload: InitPayload = serde_json::from_str(raw)?;
        Ok(payload.add_to_cart_form.configurable.sp_config)
    }

    /// First candidate that validates; the others are skipped silently.
    pub fn find_in<'a, I>(candidates: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .enumerate()
            .find_map(|(position, raw)| match Self::from_payload(raw) {
                Ok(config) => Some(config),
                Err(e) => {
                    trace!(position, "Skipping script payload: {}", e);
                    None
                }
            })
    }

    /// Deduplicated, ordered set of every salable variant-id.
    #[must_use]
    pub fn salable_variant_ids(&self) -> BTreeSet<&str> {
        self.salable
            .values()
            .flat_map(BTreeMap::values)
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// Raw option label of `option_id` within attribute `attribute_id`.
    #[must_use]
    pub fn option_label(&self, attribute_id: &str, option_id: &str) -> Option<&str> {
        self.attributes
            .get(attribute_id)?
            .options
            .iter()
            .find(|option| option.id == option_id)
            .map(|option| option.label.as_str())
    }

    #[must_use]
    pub fn final_price(&self, variant_id: &str) -> Option<f64> {
        self.option_prices
            .get(variant_id)
            .map(|prices| prices.final_price.amount)
    }

    #[must_use]
    pub fn gallery_fragment(&self, variant_id: &str) -> Option<&str> {
        self.magictoolbox
            .gallery_data
            .get(variant_id)
            .map(String::as_str)
    }

    #[must_use]
    pub fn sku(&self, variant_id: &str) -> Option<&str> {
        self.sku.get(variant_id).map(String::as_str)
    }
}

/// Accept either a JSON object or an empty JSON array.
fn map_or_empty<'de, D, V>(deserializer: D) -> Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr<V> {
        Map(BTreeMap<String, V>),
        Seq(Vec<IgnoredAny>),
    }

    match Repr::<V>::deserialize(deserializer)? {
        Repr::Map(map) => Ok(map),
        Repr::Seq(items) if items.is_empty() => Ok(BTreeMap::new()),
        Repr::Seq(_) => Err(de::Error::custom("expected an object or an empty array")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::product_payload;
    use serde_json::json;

    #[test]
    fn decodes_the_configurable_payload() {
        let raw = product_payload(&["1001", "1002"]).to_string();
        let config = ProductConfig::from_payload(&raw).unwrap();

        assert_eq!(config.product_id, "9000");
        assert_eq!(config.option_label("471", "10"), Some("Magic 2010 +kr 12,00"));
        assert_eq!(config.final_price("1001"), Some(12.5));
        assert_eq!(config.sku("1002"), Some("SKU-1002"));
        assert!(config.gallery_fragment("1001").is_some());
    }

    #[test]
    fn salable_ids_are_flattened_and_deduplicated() {
        let mut payload = product_payload(&["1001", "1002"]);
        // the same variant listed under two attributes
        payload["#product_addtocart_form"]["configurable"]["spConfig"]["salable"]["479"] =
            json!({ "77": ["1002", "1001"] });
        let config = ProductConfig::from_payload(&payload.to_string()).unwrap();

        let ids: Vec<&str> = config.salable_variant_ids().into_iter().collect();
        assert_eq!(ids, vec!["1001", "1002"]);
    }

    #[test]
    fn empty_php_arrays_decode_as_empty_maps() {
        let mut payload = product_payload(&[]);
        payload["#product_addtocart_form"]["configurable"]["spConfig"]["salable"] = json!([]);
        payload["#product_addtocart_form"]["configurable"]["spConfig"]["magictoolbox"] =
            json!({ "galleryData": [] });
        let config = ProductConfig::from_payload(&payload.to_string()).unwrap();

        assert!(config.salable_variant_ids().is_empty());
        assert!(config.magictoolbox.gallery_data.is_empty());
    }

    #[test]
    fn non_empty_array_in_place_of_a_map_is_rejected() {
        let mut payload = product_payload(&["1001"]);
        payload["#product_addtocart_form"]["configurable"]["spConfig"]["index"] = json!(["1001"]);
        assert!(ProductConfig::from_payload(&payload.to_string()).is_err());
    }

    #[test]
    fn first_validating_candidate_wins() {
        let unrelated = json!({ "*": { "Magento_Ui/js/core/app": {} } }).to_string();
        let valid = product_payload(&["1001"]).to_string();
        let mut other = product_payload(&["1002"]);
        other["#product_addtocart_form"]["configurable"]["spConfig"]["productId"] = json!("other");
        let other = other.to_string();

        let config =
            ProductConfig::find_in(["not json", unrelated.as_str(), valid.as_str(), other.as_str()])
                .unwrap();
        assert_eq!(config.product_id, "9000");
    }

    #[test]
    fn no_validating_candidate_yields_none() {
        assert!(ProductConfig::find_in(["{}", "[1, 2]", ""]).is_none());
    }
}
