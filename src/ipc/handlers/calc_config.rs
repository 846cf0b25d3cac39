use crate::calc::transmutation::{TransmutationRow, TransmutationTable};
use crate::db;
use crate::gradesheet::{self, TRANSMUTATION_KEY};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, gradesheet_err};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn config_payload(table: &TransmutationTable, is_default: bool) -> serde_json::Value {
    json!({
        "transmutation": table.rows(),
        "isDefault": is_default
    })
}

fn handle_calc_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    match gradesheet::load_transmutation(conn) {
        Ok((table, is_default)) => ok(&req.id, config_payload(&table, is_default)),
        Err(e) => gradesheet_err(&req.id, e),
    }
}

fn handle_calc_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(raw) = req.params.get("transmutation") else {
        return err(&req.id, "bad_params", "missing transmutation", None);
    };

    // null drops the override and falls back to the built-in table.
    if raw.is_null() {
        if let Err(e) = db::settings_delete(conn, TRANSMUTATION_KEY) {
            return err(&req.id, "db_delete_failed", e.to_string(), None);
        }
        tracing::info!("transmutation table reset to default");
        return ok(
            &req.id,
            config_payload(&TransmutationTable::deped_default(), true),
        );
    }

    let rows: Vec<TransmutationRow> = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("transmutation must be an array of {{lowerBound, transmuted}}: {e}"),
                None,
            )
        }
    };
    let table = match TransmutationTable::new(rows) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(error = %e, "rejected transmutation table");
            return err(&req.id, "invalid_config", e.to_string(), None);
        }
    };

    if let Err(e) = db::settings_set_json(conn, TRANSMUTATION_KEY, &json!(table.rows())) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(rows = table.rows().len(), "transmutation table updated");
    ok(&req.id, config_payload(&table, false))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calc.config.get" => Some(handle_calc_config_get(state, req)),
        "calc.config.update" => Some(handle_calc_config_update(state, req)),
        _ => None,
    }
}
