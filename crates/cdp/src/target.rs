//! Target management and session addressing.
//!
//! A "session" is nothing the client owns: attaching to a target returns an
//! opaque tag that later commands carry in their `sessionId` field so one
//! connection can drive several pages. The client forwards it verbatim.

use serde_json::{json, Value};

use webpilot_core::{Error, Result};

use crate::client::{CdpClient, SendOptions};

impl CdpClient {
    /// Enable a CDP domain (e.g., "Page", "Runtime", "Network").
    pub async fn enable_domain(&self, domain: &str, session_id: Option<&str>) -> Result<()> {
        self.send(
            &format!("{}.enable", domain),
            Some(json!({})),
            session_opts(session_id),
        )
        .await?;
        Ok(())
    }

    /// Navigate the addressed page to a URL.
    pub async fn navigate(&self, url: &str, session_id: Option<&str>) -> Result<Value> {
        self.send(
            "Page.navigate",
            Some(json!({ "url": url })),
            session_opts(session_id),
        )
        .await
    }

    /// Evaluate JavaScript in the addressed page's context.
    pub async fn evaluate(&self, expression: &str, session_id: Option<&str>) -> Result<Value> {
        self.send(
            "Runtime.evaluate",
            Some(json!({
                "expression": expression,
                "returnByValue": true,
                "awaitPromise": true,
            })),
            session_opts(session_id),
        )
        .await
    }

    /// List all browser targets (pages, iframes, workers, etc.).
    pub async fn targets(&self) -> Result<Vec<Value>> {
        let result = self
            .send("Target.getTargets", Some(json!({})), SendOptions::default())
            .await?;
        Ok(result
            .get("targetInfos")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// Create a new page target and return its targetId.
    pub async fn create_target(&self, url: &str) -> Result<String> {
        let result = self
            .send(
                "Target.createTarget",
                Some(json!({ "url": url })),
                SendOptions::default(),
            )
            .await?;
        required_str(&result, "targetId", "Target.createTarget")
    }

    /// Attach to a target in flat mode and return the session tag that
    /// routes later commands to it.
    pub async fn attach_to_target(&self, target_id: &str) -> Result<String> {
        let result = self
            .send(
                "Target.attachToTarget",
                Some(json!({ "targetId": target_id, "flatten": true })),
                SendOptions::default(),
            )
            .await?;
        required_str(&result, "sessionId", "Target.attachToTarget")
    }

    /// Bring a target to the front.
    pub async fn activate_target(&self, target_id: &str) -> Result<()> {
        self.send(
            "Target.activateTarget",
            Some(json!({ "targetId": target_id })),
            SendOptions::default(),
        )
        .await?;
        Ok(())
    }

    /// Close a target.
    pub async fn close_target(&self, target_id: &str) -> Result<()> {
        self.send(
            "Target.closeTarget",
            Some(json!({ "targetId": target_id })),
            SendOptions::default(),
        )
        .await?;
        Ok(())
    }
}

fn session_opts(session_id: Option<&str>) -> SendOptions {
    SendOptions {
        session_id: session_id.map(str::to_string),
        ..SendOptions::default()
    }
}

fn required_str(result: &Value, field: &str, method: &str) -> Result<String> {
    result
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| Error::Remote {
            message: format!("no {} in {} result", field, method),
        })
}
