//! Wire messages shared by the gateway and the client projection.
//!
//! REST bodies are camelCase except the Telegram auth request, which carries
//! the identity provider's snake_case field names unchanged. Push messages
//! use the `{type, data?}` envelope.

use serde::{Deserialize, Serialize};

use crate::db::{AccountWithRelated, ActiveBoost, Generator, Task};
use crate::economy::{BoostKind, GeneratorKind, TaskKind, UpgradeKind};

// ── Requests ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramAuthRequest {
    pub id: i64,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Referral code of the inviting account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_param: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardPointsRequest {
    pub points: f64,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<i32>,
}

/// Unlock payload: the generator minus its id. Only `type`, `baseOutput`
/// and `upgradeCost` (the chosen price) are read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGeneratorPayload {
    #[serde(rename = "type")]
    pub kind: GeneratorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_output: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_cost: Option<f64>,
}

/// Either `{generatorId}` (upgrade) or `{newGenerator}` (unlock).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_generator: Option<NewGeneratorPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostRequest {
    #[serde(rename = "type")]
    pub kind: BoostKind,
    pub cost: f64,
    /// Hours.
    #[serde(default)]
    pub duration: f64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeRequest {
    #[serde(rename = "type")]
    pub kind: UpgradeKind,
    pub cost: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompleteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgressRequest {
    pub task_id: i64,
    /// Delta, not an absolute value.
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRequest {
    pub wallet_address: String,
}

// ── Responses ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    pub user: AccountWithRelated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsResponse {
    pub success: bool,
    pub points: f64,
    pub energy: i32,
    pub level: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorResponse {
    pub success: bool,
    pub generator: Generator,
    pub user_points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost: Option<ActiveBoost>,
    pub user_points: f64,
    /// Present for energy refills.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeResponse {
    pub success: bool,
    pub user_points: f64,
    pub max_energy: i32,
    pub energy: i32,
    pub tap_bonus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompleteResponse {
    pub success: bool,
    pub task: Task,
    pub user_points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgressResponse {
    pub success: bool,
    pub task: Task,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub success: bool,
    pub wallet_address: String,
}

/// `GET /api/catalog`: the shop as clients see it. Prices are what the
/// client sends back in its purchase requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResponse {
    pub success: bool,
    pub base_tap_yield: f64,
    pub referral_bonus: f64,
    pub generators: Vec<GeneratorListing>,
    pub boosts: Vec<BoostListing>,
    pub upgrades: Vec<UpgradeListing>,
    pub social_tasks: Vec<SocialTaskListing>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorListing {
    #[serde(rename = "type")]
    pub kind: GeneratorKind,
    pub name: String,
    pub base_output: f64,
    pub unlock_cost: f64,
    pub starter: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostListing {
    #[serde(rename = "type")]
    pub kind: BoostKind,
    pub name: String,
    pub cost: f64,
    /// Hours.
    pub duration: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeListing {
    #[serde(rename = "type")]
    pub kind: UpgradeKind,
    pub name: String,
    pub cost: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialTaskListing {
    pub name: String,
    pub reward: f64,
}

impl CatalogResponse {
    pub fn generator(&self, kind: GeneratorKind) -> Option<&GeneratorListing> {
        self.generators.iter().find(|g| g.kind == kind)
    }

    pub fn boost(&self, kind: BoostKind) -> Option<&BoostListing> {
        self.boosts.iter().find(|b| b.kind == kind)
    }

    pub fn upgrade(&self, kind: UpgradeKind) -> Option<&UpgradeListing> {
        self.upgrades.iter().find(|u| u.kind == kind)
    }

    pub fn social_task(&self, name: &str) -> Option<&SocialTaskListing> {
        self.social_tasks.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }
}

/// Body of every failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureResponse {
    pub success: bool,
    pub message: String,
}

// ── Push channel ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserSummary {
    pub display_name: String,
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralNotice {
    pub referral_bonus: f64,
    pub new_user: NewUserSummary,
}

/// Server → client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum PushMessage {
    Connection { message: String },
    Sync(Box<AccountWithRelated>),
    ReferralComplete(ReferralNotice),
}

impl PushMessage {
    pub fn welcome() -> Self {
        PushMessage::Connection {
            message: "Connected to server".to_string(),
        }
    }
}

/// Client → server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Sync,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_envelope_shapes() {
        let welcome = serde_json::to_value(PushMessage::welcome()).unwrap();
        assert_eq!(
            welcome,
            json!({"type": "connection", "data": {"message": "Connected to server"}})
        );

        let referral = PushMessage::ReferralComplete(ReferralNotice {
            referral_bonus: 250.0,
            new_user: NewUserSummary {
                display_name: "Ada L".into(),
                id: 12,
            },
        });
        let value = serde_json::to_value(&referral).unwrap();
        assert_eq!(value["type"], "referralComplete");
        assert_eq!(value["data"]["referralBonus"], 250.0);
        assert_eq!(value["data"]["newUser"]["displayName"], "Ada L");
        assert_eq!(serde_json::from_value::<PushMessage>(value).unwrap(), referral);
    }

    #[test]
    fn client_sync_request_parses() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"sync"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Sync);
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).is_err());
    }

    #[test]
    fn generator_request_accepts_full_unlock_payload() {
        let req: GeneratorRequest = serde_json::from_value(json!({
            "newGenerator": {
                "type": "station",
                "level": 1,
                "baseOutput": 25,
                "currentOutput": 25,
                "upgradeCost": 3500,
                "isUnlocked": true
            }
        }))
        .unwrap();
        let payload = req.new_generator.unwrap();
        assert_eq!(payload.kind, GeneratorKind::Station);
        assert_eq!(payload.upgrade_cost, Some(3500.0));
        assert!(req.generator_id.is_none());
    }

    #[test]
    fn boost_request_defaults() {
        let req: BoostRequest =
            serde_json::from_value(json!({"type": "energy_refill", "cost": 2000})).unwrap();
        assert_eq!(req.kind, BoostKind::EnergyRefill);
        assert_eq!((req.duration, req.multiplier), (0.0, 1.0));
    }
}
