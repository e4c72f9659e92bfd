/// Subscription plans
///
/// Plans are loaded once from configuration as a JSON list:
///
/// ```json
/// [
///   { "price_id": "price_basic", "name": "Basic", "price": "$5/mo",
///     "details": ["Unlimited tasks", "Email support"] }
/// ]
/// ```

use serde::{Deserialize, Serialize};

/// A subscription tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Payment gateway price identifier
    pub price_id: String,

    /// Display name
    pub name: String,

    /// Display price, e.g. "$5/mo"
    pub price: String,

    /// Bullet points shown on the account page
    #[serde(default)]
    pub details: Vec<String>,

    /// Whether this is the viewer's active plan; computed per request
    #[serde(default)]
    pub current: bool,
}

/// Parses a JSON plan list
pub fn parse_plans(json: &str) -> Result<Vec<Plan>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Copies `plans`, marking the one whose price matches `current_price_id`
pub fn mark_current(plans: &[Plan], current_price_id: Option<&str>) -> Vec<Plan> {
    plans
        .iter()
        .map(|plan| Plan {
            current: current_price_id == Some(plan.price_id.as_str()),
            ..plan.clone()
        })
        .collect()
}
