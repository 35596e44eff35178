use serde::{Deserialize, Serialize};

// ── Database models ──

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub duration_min: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Professional {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub specialty: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub notes: String,
}

/// Appointment row joined against the three directories. Times are
/// stored as TEXT in `%Y-%m-%d %H:%M`; `end_at` is snapshotted from the
/// service duration at create/edit time, so later catalog edits never
/// move an existing interval. The names are `Option` because a
/// referenced record may have been deleted out from under an old
/// appointment; listings surface that as null instead of failing.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AppointmentDetail {
    pub id: i64,
    pub client_id: i64,
    pub client_name: Option<String>,
    pub professional_id: i64,
    pub professional_name: Option<String>,
    pub service_id: i64,
    pub service_name: Option<String>,
    pub service_price: Option<f64>,
    pub start_at: String,
    pub end_at: String,
    pub notes: String,
    pub created_at: String,
}

// ── API request/response types ──

/// Raw scheduling form as the presentation layer submits it. Date and
/// time arrive as strings and are validated once at the boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentForm {
    pub client_id: i64,
    pub professional_id: i64,
    pub service_id: i64,
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentListQuery {
    pub professional_id: Option<i64>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClientForm {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfessionalForm {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfessionalUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub specialty: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceForm {
    pub name: String,
    pub price: f64,
    pub duration_min: i64,
}

#[derive(Debug, Deserialize)]
pub struct ServiceUpdate {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub duration_min: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InventoryItem {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub quantity: i64,
    pub unit_price: f64,
}

#[derive(Debug, Deserialize)]
pub struct InventoryForm {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub quantity: i64,
    pub unit_price: f64,
}

#[derive(Debug, Deserialize)]
pub struct InventoryUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct FinanceQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
    pub sheet: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub payment_id: String,
    pub payment_url: String,
    pub plan: String,
    pub amount: f64,
}

/// Payment provider webhook payload. Only the fields we log are typed;
/// the provider sends more.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhookEvent {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Option<PaymentWebhookData>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentWebhookData {
    pub id: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
