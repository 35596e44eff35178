use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use rust_xlsxwriter::Workbook;
use std::sync::Arc;

use crate::scheduler::AppointmentFilter;
use crate::{error::AppError, models::*, AppState};

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const CLIENT_HEADERS: [&str; 5] = ["id", "name", "phone", "email", "notes"];
const APPOINTMENT_HEADERS: [&str; 8] = [
    "id",
    "client",
    "professional",
    "service",
    "price",
    "start",
    "end",
    "notes",
];
const INVENTORY_HEADERS: [&str; 5] = ["id", "name", "category", "quantity", "unit_price"];

/// GET /api/export — operational data as a spreadsheet. The default is
/// an xlsx workbook with one worksheet per dataset; `?format=csv&sheet=`
/// is the fallback for environments without a spreadsheet reader.
pub async fn export(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let clients = sqlx::query_as::<_, Client>(
        "SELECT id, name, phone, email, notes FROM clients ORDER BY id ASC",
    )
    .fetch_all(&state.db)
    .await?;
    let appointments = state.scheduler.list(AppointmentFilter::default()).await?;
    let inventory = sqlx::query_as::<_, InventoryItem>(
        "SELECT id, name, category, quantity, unit_price FROM inventory ORDER BY id ASC",
    )
    .fetch_all(&state.db)
    .await?;

    let stamp = Utc::now().format("%Y%m%d_%H%M%S");

    match query.format.as_deref() {
        None | Some("xlsx") => {
            let buffer = build_workbook(&clients, &appointments, &inventory)?;
            Ok(attachment_response(
                XLSX_MIME,
                &format!("planilha_agenda_{}.xlsx", stamp),
                buffer,
            ))
        }
        Some("csv") => match query.sheet.as_deref() {
            Some("clients") => Ok(attachment_response(
                "text/csv; charset=utf-8",
                &format!("clientes_{}.csv", stamp),
                clients_csv(&clients).into_bytes(),
            )),
            Some("appointments") => Ok(attachment_response(
                "text/csv; charset=utf-8",
                &format!("agendamentos_{}.csv", stamp),
                appointments_csv(&appointments).into_bytes(),
            )),
            Some("inventory") => Ok(attachment_response(
                "text/csv; charset=utf-8",
                &format!("estoque_{}.csv", stamp),
                inventory_csv(&inventory).into_bytes(),
            )),
            _ => Err(AppError::Validation(
                "csv export requires sheet=clients, sheet=appointments or sheet=inventory".into(),
            )),
        },
        Some(other) => Err(AppError::Validation(format!(
            "unknown export format '{}': expected xlsx or csv",
            other
        ))),
    }
}

fn attachment_response(mime: &str, filename: &str, body: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

/// Workbook with `Clientes`, `Agendamentos` and `Estoque` worksheets.
fn build_workbook(
    clients: &[Client],
    appointments: &[AppointmentDetail],
    inventory: &[InventoryItem],
) -> Result<Vec<u8>, AppError> {
    let xlsx = |e: rust_xlsxwriter::XlsxError| AppError::Export(e.to_string());

    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name("Clientes").map_err(xlsx)?;
    for (col, header) in CLIENT_HEADERS.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).map_err(xlsx)?;
    }
    for (i, client) in clients.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.write_number(r, 0, client.id as f64).map_err(xlsx)?;
        sheet.write_string(r, 1, &client.name).map_err(xlsx)?;
        sheet.write_string(r, 2, &client.phone).map_err(xlsx)?;
        sheet.write_string(r, 3, &client.email).map_err(xlsx)?;
        sheet.write_string(r, 4, &client.notes).map_err(xlsx)?;
    }

    let sheet = workbook.add_worksheet();
    sheet.set_name("Agendamentos").map_err(xlsx)?;
    for (col, header) in APPOINTMENT_HEADERS.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).map_err(xlsx)?;
    }
    for (i, appt) in appointments.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.write_number(r, 0, appt.id as f64).map_err(xlsx)?;
        sheet
            .write_string(r, 1, appt.client_name.as_deref().unwrap_or(""))
            .map_err(xlsx)?;
        sheet
            .write_string(r, 2, appt.professional_name.as_deref().unwrap_or(""))
            .map_err(xlsx)?;
        sheet
            .write_string(r, 3, appt.service_name.as_deref().unwrap_or(""))
            .map_err(xlsx)?;
        sheet
            .write_number(r, 4, appt.service_price.unwrap_or(0.0))
            .map_err(xlsx)?;
        sheet.write_string(r, 5, &appt.start_at).map_err(xlsx)?;
        sheet.write_string(r, 6, &appt.end_at).map_err(xlsx)?;
        sheet.write_string(r, 7, &appt.notes).map_err(xlsx)?;
    }

    let sheet = workbook.add_worksheet();
    sheet.set_name("Estoque").map_err(xlsx)?;
    for (col, header) in INVENTORY_HEADERS.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).map_err(xlsx)?;
    }
    for (i, item) in inventory.iter().enumerate() {
        let r = (i + 1) as u32;
        sheet.write_number(r, 0, item.id as f64).map_err(xlsx)?;
        sheet.write_string(r, 1, &item.name).map_err(xlsx)?;
        sheet.write_string(r, 2, &item.category).map_err(xlsx)?;
        sheet
            .write_number(r, 3, item.quantity as f64)
            .map_err(xlsx)?;
        sheet.write_number(r, 4, item.unit_price).map_err(xlsx)?;
    }

    workbook.save_to_buffer().map_err(xlsx)
}

fn clients_csv(clients: &[Client]) -> String {
    let mut out = csv_row(&CLIENT_HEADERS.map(String::from));
    for c in clients {
        out.push_str(&csv_row(&[
            c.id.to_string(),
            c.name.clone(),
            c.phone.clone(),
            c.email.clone(),
            c.notes.clone(),
        ]));
    }
    out
}

fn appointments_csv(appointments: &[AppointmentDetail]) -> String {
    let mut out = csv_row(&APPOINTMENT_HEADERS.map(String::from));
    for a in appointments {
        out.push_str(&csv_row(&[
            a.id.to_string(),
            a.client_name.clone().unwrap_or_default(),
            a.professional_name.clone().unwrap_or_default(),
            a.service_name.clone().unwrap_or_default(),
            a.service_price.map(|p| p.to_string()).unwrap_or_default(),
            a.start_at.clone(),
            a.end_at.clone(),
            a.notes.clone(),
        ]));
    }
    out
}

fn inventory_csv(inventory: &[InventoryItem]) -> String {
    let mut out = csv_row(&INVENTORY_HEADERS.map(String::from));
    for i in inventory {
        out.push_str(&csv_row(&[
            i.id.to_string(),
            i.name.clone(),
            i.category.clone(),
            i.quantity.to_string(),
            i.unit_price.to_string(),
        ]));
    }
    out
}

fn csv_row(fields: &[String]) -> String {
    let mut row = fields
        .iter()
        .map(|f| csv_field(f))
        .collect::<Vec<_>>()
        .join(",");
    row.push_str("\r\n");
    row
}

/// Quote a field when it contains a comma, quote or line break; embedded
/// quotes are doubled (RFC 4180).
fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
