//! Page-level driver wrapping a CDP client attached to one target.
//!
//! Provides the operations a render task needs: device emulation, scripts
//! installed before any page script runs, navigation, evaluation, element
//! measurement, and clipped PNG screenshots.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde_json::Value;

use crate::cdp::CdpClient;
use crate::error::BrowserError;

/// Opaque handle to a DOM node, as returned by CDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub i64);

/// Bounding box of a DOM element in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Screenshot region snapped to whole CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clip {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl From<ElementBox> for Clip {
    /// Floor the origin and ceil the far edge so the clip covers the whole box
    /// and repeated renders of the same layout produce the same size.
    fn from(b: ElementBox) -> Self {
        let x = b.x.floor();
        let y = b.y.floor();
        Clip {
            x: x as i64,
            y: y as i64,
            width: ((b.x + b.width).ceil() - x) as i64,
            height: ((b.y + b.height).ceil() - y) as i64,
        }
    }
}

/// Device emulation applied to a page before navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct Emulation {
    pub width: u32,
    pub height: u32,
    pub scale: f64,
    pub locale: String,
    pub timezone: String,
}

/// Driver for a single page target.
pub struct PageSession {
    client: CdpClient,
}

impl PageSession {
    /// Attach to a page target's WebSocket and enable the domains used here.
    ///
    /// `Runtime` stays disabled: `Runtime.evaluate` works without it and its
    /// console and context events would only fill the event queue.
    pub async fn attach(ws_url: &str, command_timeout: Duration) -> Result<Self, BrowserError> {
        let client = CdpClient::connect(ws_url)
            .await?
            .with_call_timeout(command_timeout);
        client.enable("Page").await?;
        client.enable("DOM").await?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &CdpClient {
        &self.client
    }

    /// Apply viewport size, pixel density, locale and timezone overrides.
    pub async fn emulate(&self, emulation: &Emulation) -> Result<(), BrowserError> {
        self.client
            .call(
                "Emulation.setDeviceMetricsOverride",
                build_device_metrics_params(emulation.width, emulation.height, emulation.scale),
            )
            .await?;
        self.client
            .call(
                "Emulation.setLocaleOverride",
                serde_json::json!({ "locale": emulation.locale }),
            )
            .await?;
        self.client
            .call(
                "Emulation.setTimezoneOverride",
                serde_json::json!({ "timezoneId": emulation.timezone }),
            )
            .await?;
        Ok(())
    }

    /// Install a script that runs in every new document before page scripts.
    pub async fn add_init_script(&self, source: &str) -> Result<(), BrowserError> {
        self.client
            .call(
                "Page.addScriptToEvaluateOnNewDocument",
                serde_json::json!({ "source": source }),
            )
            .await?;
        Ok(())
    }

    /// Navigate and wait for `Page.loadEventFired`.
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        let result = self
            .client
            .call("Page.navigate", serde_json::json!({ "url": url }))
            .await?;

        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            return Err(BrowserError::NavigationFailed {
                reason: format!("{url}: {error_text}"),
            });
        }

        self.client
            .await_event("Page.loadEventFired", timeout)
            .await?;
        Ok(())
    }

    /// Evaluate a JavaScript expression and return its value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .client
            .call("Runtime.evaluate", build_evaluate_params(expression))
            .await?;
        evaluation_value(&result)
    }

    async fn document_root(&self) -> Result<i64, BrowserError> {
        let result = self
            .client
            .call("DOM.getDocument", serde_json::json!({ "depth": 0 }))
            .await?;

        result
            .get("root")
            .and_then(|r| r.get("nodeId"))
            .and_then(|n| n.as_i64())
            .ok_or_else(|| BrowserError::Protocol {
                detail: "DOM.getDocument did not return a root nodeId".to_string(),
            })
    }

    /// Find a single element matching a CSS selector.
    pub async fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, BrowserError> {
        let root_id = self.document_root().await?;
        let result = self
            .client
            .call(
                "DOM.querySelector",
                serde_json::json!({ "nodeId": root_id, "selector": selector }),
            )
            .await?;

        match result.get("nodeId").and_then(|n| n.as_i64()).unwrap_or(0) {
            0 => Ok(None),
            id => Ok(Some(NodeId(id))),
        }
    }

    /// Border-box bounds of the element matching `selector`.
    pub async fn element_box(&self, selector: &str) -> Result<ElementBox, BrowserError> {
        let node_id = self
            .query_selector(selector)
            .await?
            .ok_or_else(|| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })?;

        let result = self
            .client
            .call("DOM.getBoxModel", serde_json::json!({ "nodeId": node_id.0 }))
            .await
            .map_err(|e| BrowserError::ElementNotMeasurable {
                selector: selector.to_string(),
                reason: e.to_string(),
            })?;

        let quad: Vec<f64> = result
            .get("model")
            .and_then(|m| m.get("border"))
            .and_then(|c| c.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_f64()).collect())
            .unwrap_or_default();

        let bbox = bounds_of_quad(&quad).ok_or_else(|| BrowserError::ElementNotMeasurable {
            selector: selector.to_string(),
            reason: format!("box model quad has {} coordinates, expected 8", quad.len()),
        })?;

        if bbox.width <= 0.0 || bbox.height <= 0.0 {
            return Err(BrowserError::ElementNotMeasurable {
                selector: selector.to_string(),
                reason: format!("element has zero size: {}x{}", bbox.width, bbox.height),
            });
        }
        Ok(bbox)
    }

    /// Capture a PNG of `clip`, including content outside the viewport.
    pub async fn screenshot_clip(&self, clip: Clip) -> Result<Vec<u8>, BrowserError> {
        let result = self
            .client
            .call("Page.captureScreenshot", build_clip_screenshot_params(clip))
            .await?;

        let data_b64 = result
            .get("data")
            .and_then(|d| d.as_str())
            .ok_or_else(|| BrowserError::Protocol {
                detail: "Page.captureScreenshot did not return 'data' field".to_string(),
            })?;

        B64.decode(data_b64).map_err(|e| BrowserError::Protocol {
            detail: format!("failed to decode screenshot base64: {e}"),
        })
    }
}

/// Build CDP `Runtime.evaluate` parameters.
pub fn build_evaluate_params(expression: &str) -> Value {
    serde_json::json!({
        "expression": expression,
        "returnByValue": true,
        "awaitPromise": true,
    })
}

/// Build CDP `Emulation.setDeviceMetricsOverride` parameters.
pub fn build_device_metrics_params(width: u32, height: u32, scale: f64) -> Value {
    serde_json::json!({
        "width": width,
        "height": height,
        "deviceScaleFactor": scale,
        "mobile": false,
    })
}

/// Build CDP `Page.captureScreenshot` parameters for a clipped PNG.
pub fn build_clip_screenshot_params(clip: Clip) -> Value {
    serde_json::json!({
        "format": "png",
        "fromSurface": true,
        "captureBeyondViewport": true,
        "clip": {
            "x": clip.x,
            "y": clip.y,
            "width": clip.width,
            "height": clip.height,
            "scale": 1,
        },
    })
}

/// Extract the value of a `Runtime.evaluate` result, surfacing exceptions.
pub fn evaluation_value(result: &Value) -> Result<Value, BrowserError> {
    if let Some(exception) = result.get("exceptionDetails") {
        let message = exception
            .get("exception")
            .and_then(|e| e.get("description"))
            .and_then(|d| d.as_str())
            .or_else(|| exception.get("text").and_then(|t| t.as_str()))
            .unwrap_or("unknown exception")
            .to_string();
        return Err(BrowserError::JsException { message });
    }
    Ok(result
        .get("result")
        .and_then(|r| r.get("value"))
        .cloned()
        .unwrap_or(Value::Null))
}

/// Axis-aligned bounds of an 8-value quad `[x1,y1, x2,y2, x3,y3, x4,y4]`.
pub fn bounds_of_quad(quad: &[f64]) -> Option<ElementBox> {
    if quad.len() < 8 {
        return None;
    }
    let xs = quad.iter().step_by(2).take(4);
    let ys = quad.iter().skip(1).step_by(2).take(4);
    let (min_x, max_x) = xs.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    });
    let (min_y, max_y) = ys.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    });
    Some(ElementBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    })
}
