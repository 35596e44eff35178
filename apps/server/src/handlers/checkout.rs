use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::{error::AppError, models::*, AppState};

const MP_PAYMENTS_URL: &str = "https://api.mercadopago.com/v1/payments";

/// Price table for subscription plans. `avista` and `parcelado` are the
/// annual options: 120/month with a 10% discount upfront or a 5%
/// surcharge in installments.
fn plan_quote(plan: &str) -> Option<(f64, &'static str)> {
    match plan {
        "basico" => Some((29.90, "Plano Básico")),
        "profissional" => Some((59.90, "Plano Profissional")),
        "premium" => Some((99.90, "Plano Premium")),
        "avista" => Some((120.0 * 0.9, "Plano Anual à Vista")),
        "parcelado" => Some((120.0 * 1.05, "Plano Anual Parcelado")),
        _ => None,
    }
}

/// POST /api/checkout — create a PIX payment with Mercado Pago and hand
/// the payer the ticket URL.
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<ApiResponse<CheckoutResponse>>, AppError> {
    let plan = body.plan.trim().to_lowercase();
    let Some((amount, description)) = plan_quote(&plan) else {
        return Err(AppError::Validation(format!("unknown plan '{}'", plan)));
    };

    let email = body.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("payer email is required".into()));
    }

    if state.mp_access_token.is_empty() {
        return Err(AppError::Upstream(
            "payment provider is not configured".into(),
        ));
    }

    let (payment_id, payment_url) = create_pix_payment(
        &state.mp_access_token,
        amount,
        description,
        email,
    )
    .await?;

    tracing::info!("checkout created: plan={} payment_id={}", plan, payment_id);

    Ok(Json(ApiResponse::success(CheckoutResponse {
        payment_id,
        payment_url,
        plan,
        amount,
    })))
}

/// Create a PIX payment and return (payment id, ticket URL).
async fn create_pix_payment(
    access_token: &str,
    amount: f64,
    description: &str,
    payer_email: &str,
) -> Result<(String, String), AppError> {
    let client = reqwest::Client::new();

    let idempotency_key = format!(
        "checkout-{}-{}",
        payer_email,
        chrono::Utc::now().timestamp_millis()
    );

    let body = serde_json::json!({
        "transaction_amount": amount,
        "description": description,
        "payment_method_id": "pix",
        "payer": {
            "email": payer_email
        }
    });

    let resp = client
        .post(MP_PAYMENTS_URL)
        .bearer_auth(access_token)
        .header("X-Idempotency-Key", &idempotency_key)
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("payment request failed: {}", e)))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        tracing::error!("Mercado Pago payment creation failed: {} - {}", status, text);
        return Err(AppError::Upstream(format!(
            "payment provider returned {}",
            status
        )));
    }

    let json: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("bad payment response: {}", e)))?;

    let payment_id = json["id"]
        .as_i64()
        .map(|id| id.to_string())
        .or_else(|| json["id"].as_str().map(String::from))
        .ok_or_else(|| AppError::Upstream("payment response missing id".into()))?;

    let ticket_url = json["point_of_interaction"]["transaction_data"]["ticket_url"]
        .as_str()
        .ok_or_else(|| AppError::Upstream("payment response missing ticket URL".into()))?
        .to_string();

    Ok((payment_id, ticket_url))
}

/// POST /api/checkout/webhook — Mercado Pago notification endpoint.
/// Always answers 200 so the provider stops retrying; the event is
/// logged for reconciliation.
pub async fn checkout_webhook(Json(event): Json<PaymentWebhookEvent>) -> StatusCode {
    let payment_id = event
        .data
        .as_ref()
        .and_then(|d| d.id.as_ref())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "?".to_string());

    tracing::info!(
        "payment webhook: action={} type={} payment_id={}",
        event.action.as_deref().unwrap_or("?"),
        event.kind.as_deref().unwrap_or("?"),
        payment_id
    );

    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monthly_plans_priced() {
        assert_eq!(plan_quote("basico").unwrap().0, 29.90);
        assert_eq!(plan_quote("profissional").unwrap().0, 59.90);
        assert_eq!(plan_quote("premium").unwrap().0, 99.90);
    }

    #[test]
    fn test_annual_upfront_gets_discount() {
        let (amount, _) = plan_quote("avista").unwrap();
        assert!((amount - 108.0).abs() < 1e-9);
    }

    #[test]
    fn test_annual_installments_get_surcharge() {
        let (amount, _) = plan_quote("parcelado").unwrap();
        assert!((amount - 126.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_plan_rejected() {
        assert!(plan_quote("enterprise").is_none());
        assert!(plan_quote("").is_none());
    }
}
