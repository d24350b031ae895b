//! Shared test fixtures: scripted transports and catalog documents.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::domain::ProductConfig;
use crate::infrastructure::http_client::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Replays a fixed sequence of results, one per call.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    repeat_failure: Option<TransportError>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<HttpResponse, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat_failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fails every call with `error`.
    pub fn failing(error: TransportError) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            repeat_failure: Some(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        Err(self.repeat_failure.clone().unwrap_or(TransportError::Request {
            url,
            message: "script exhausted".to_string(),
        }))
    }
}

/// Serves fixed bodies by exact URL; unknown URLs answer 404.
#[derive(Default)]
pub struct RoutedTransport {
    routes: Mutex<HashMap<String, Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<String>>,
}

impl RoutedTransport {
    pub fn route(self, url: &str, status: u16, body: impl Into<String>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(HttpResponse::new(url, status, body)));
        self
    }

    pub fn fail(self, url: &str) -> Self {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Err(TransportError::Connect {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
        );
        self
    }

    pub fn hits(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl HttpTransport for RoutedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.url.clone());
        self.routes
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Ok(HttpResponse::new(&request.url, 404, "not found")))
    }
}

/// Configurable-product payload with three attributes.
///
/// Variants: `1001` (Magic 2010 / 146 / Non-foil), `1002` (Dominaria / 147 /
/// Foil) and `1003`, whose index entry lacks the surface attribute. The given
/// ids are listed as salable.
pub fn product_payload(salable: &[&str]) -> Value {
    json!({
        "#product_addtocart_form": {
            "configurable": {
                "spConfig": {
                    "productId": "9000",
                    "attributes": {
                        "471": {
                            "id": "471", "code": "mtg_set", "label": "Set", "position": "0",
                            "options": [
                                { "id": "10", "label": "Magic 2010 +kr 12,00", "products": ["1001", "1003"] },
                                { "id": "11", "label": "Dominaria", "products": ["1002"] }
                            ]
                        },
                        "479": {
                            "id": "479", "code": "mtg_number", "label": "Card number",
                            "options": [
                                { "id": "77", "label": "146", "products": ["1001", "1003"] },
                                { "id": "78", "label": "147", "products": ["1002"] }
                            ]
                        },
                        "473": {
                            "id": "473", "code": "mtg_surface", "label": "Surface",
                            "options": [
                                { "id": "3", "label": "Non-foil", "products": ["1001"] },
                                { "id": "4", "label": "Foil +kr 40,00", "products": ["1002"] }
                            ]
                        }
                    },
                    "optionPrices": {
                        "1001": { "finalPrice": { "amount": 12.5 }, "basePrice": { "amount": 10.0 } },
                        "1002": { "finalPrice": { "amount": 30.0 } },
                        "1003": { "finalPrice": { "amount": 5.0 } }
                    },
                    "index": {
                        "1001": { "471": "10", "479": "77", "473": "3" },
                        "1002": { "471": "11", "479": "78", "473": "4" },
                        "1003": { "471": "10", "479": "77" }
                    },
                    "salable": { "471": { "10": salable } },
                    "magictoolbox": {
                        "galleryData": {
                            "1001": "<a class=\"mt-thumb\" href=\"https://cdn.shop.test/1001-large.jpg\"><img src=\"https://cdn.shop.test/1001.jpg\"></a>",
                            "1002": "<a class=\"mt-thumb\" href=\"https://cdn.shop.test/1002-large.jpg\"></a>"
                        }
                    },
                    "sku": { "1001": "SKU-1001", "1002": "SKU-1002", "1003": "SKU-1003" }
                }
            }
        }
    })
}

pub fn product_config(salable: &[&str]) -> ProductConfig {
    ProductConfig::from_payload(&product_payload(salable).to_string()).unwrap()
}

/// Item document embedding `payload` next to an unrelated init script.
pub fn item_page(title: &str, payload: Option<&Value>) -> String {
    let payload = payload.map(Value::to_string).unwrap_or_default();
    format!(
        r#"<html><body>
<h1 class="page-title"><span class="base">{title}</span></h1>
<script type="text/x-magento-init">{{"*": {{"Magento_Ui/js/core/app": {{"components": {{}}}}}}}}</script>
<script type="text/x-magento-init">{payload}</script>
</body></html>"#
    )
}

/// Listing document linking to `hrefs`.
pub fn listing_page(hrefs: &[&str]) -> String {
    let items: String = hrefs
        .iter()
        .map(|href| {
            format!(
                r#"<li class="product-item"><div class="product-item-info"><strong class="product-item-name"><a class="product-item-link" href="{href}">Card</a></strong></div></li>"#
            )
        })
        .collect();
    format!(r#"<html><body><ol class="products list">{items}</ol></body></html>"#)
}

pub fn stock_body(entries: &[(&str, i64)]) -> String {
    let entries: Vec<Value> = entries
        .iter()
        .map(|(name, qty)| json!({ "name": name, "qty": qty }))
        .collect();
    Value::Array(entries).to_string()
}
