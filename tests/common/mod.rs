//! Fixtures shared by the integration tests: an in-memory shop.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use stock_crawler_lib::AppConfig;
use stock_crawler_lib::infrastructure::{HttpRequest, HttpResponse, HttpTransport, IdentityMode, TransportError};

pub const BASE: &str = "https://shop.test";

pub fn listing_url(page: u32) -> String {
    format!("{BASE}/catalog?p={page}")
}

pub fn stock_url(variant_id: &str) -> String {
    format!("{BASE}/stock?productId={variant_id}")
}

pub fn item_url(slug: &str, id: u32) -> String {
    format!("{BASE}/p-{slug}-{id}")
}

/// Configuration pointed at the in-memory shop with fast retries.
pub fn shop_config(pages: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.site.base_url = BASE.to_string();
    config.site.listing_url_template = format!("{BASE}/catalog?p={{page}}");
    config.site.inventory_url_template = format!("{BASE}/stock?productId={{id}}");
    config.site.stock_location = "Oslo".to_string();
    config.site.target_host = Some("shop.test".to_string());
    config.crawl.page_count = pages;
    config.crawl.listing_concurrency = 2;
    config.crawl.item_concurrency = 3;
    config.fetch.max_retries = 1;
    config.fetch.retry_delay_ms = 10;
    config.fetch.identity = IdentityMode::Fixed;
    config.fetch.user_agents = Some(vec!["integration-agent".to_string()]);
    config
}

/// Serves bodies by exact URL and records every request.
#[derive(Default)]
pub struct ShopTransport {
    routes: Mutex<HashMap<String, Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ShopTransport {
    pub fn page(self, url: &str, body: impl Into<String>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(HttpResponse::new(url, 200, body)));
        self
    }

    pub fn unreachable(self, url: &str) -> Self {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Err(TransportError::Timeout { url: url.to_string() }),
        );
        self
    }

    pub fn hits(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| r.url == url).count()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ShopTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        self.routes
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .unwrap_or_else(|| Ok(HttpResponse::new(&url, 404, "not found")))
    }
}

pub fn listing_page(hrefs: &[String]) -> String {
    let items: String = hrefs
        .iter()
        .map(|href| {
            format!(
                r#"<li class="product-item"><div class="product-item-info"><strong class="product-item-name"><a href="{href}">Card</a></strong></div></li>"#
            )
        })
        .collect();
    format!(r#"<html><body><ol class="products list">{items}</ol></body></html>"#)
}

pub fn item_page(title: &str, payload: Option<&Value>) -> String {
    let payload = payload.map(Value::to_string).unwrap_or_default();
    format!(
        r#"<html><body><h1 class="page-title"><span class="base">{title}</span></h1><script type="text/x-magento-init">{payload}</script></body></html>"#
    )
}

pub fn stock_body(entries: &[(&str, i64)]) -> String {
    let entries: Vec<Value> = entries
        .iter()
        .map(|(name, qty)| json!({ "name": name, "qty": qty }))
        .collect();
    Value::Array(entries).to_string()
}

/// Product with two variants, `<base>1` (non-foil) and `<base>2` (foil), both salable.
pub fn two_variant_payload(base: u32) -> Value {
    let plain = format!("{base}1");
    let foil = format!("{base}2");
    json!({
        "#product_addtocart_form": {
            "configurable": {
                "spConfig": {
                    "productId": base.to_string(),
                    "attributes": {
                        "471": { "id": "471", "code": "mtg_set", "label": "Set",
                            "options": [{ "id": "10", "label": "Magic 2010", "products": [plain, foil] }] },
                        "479": { "id": "479", "code": "mtg_number", "label": "Number",
                            "options": [{ "id": "77", "label": "146", "products": [plain, foil] }] },
                        "473": { "id": "473", "code": "mtg_surface", "label": "Surface",
                            "options": [
                                { "id": "3", "label": "Non-foil", "products": [plain] },
                                { "id": "4", "label": "Foil +kr 40,00", "products": [foil] }
                            ] }
                    },
                    "optionPrices": {
                        plain.clone(): { "finalPrice": { "amount": 10.0 } },
                        foil.clone(): { "finalPrice": { "amount": 50.0 } }
                    },
                    "index": {
                        plain.clone(): { "471": "10", "479": "77", "473": "3" },
                        foil.clone(): { "471": "10", "479": "77", "473": "4" }
                    },
                    "salable": { "471": { "10": [plain, foil] } },
                    "magictoolbox": { "galleryData": {
                        plain.clone(): format!(r#"<a href="{BASE}/media/{plain}.jpg"><img src="{BASE}/media/{plain}-small.jpg"></a>"#)
                    } }
                }
            }
        }
    })
}
