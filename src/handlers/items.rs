// handlers/items.rs - item endpoints, echoing their validated input

use serde_json::{json, Value};

use crate::route::{HandlerResult, RequestContext};

/// POST /items - `{name: string, qty: number, tags?: array, draft?: boolean}`
pub async fn create_item(ctx: RequestContext) -> HandlerResult {
    Ok(Value::Object(ctx.body))
}

/// GET /items - optional `tags` filter from the query string
pub async fn list_items(ctx: RequestContext) -> HandlerResult {
    Ok(json!({
        "items": [],
        "filter": Value::Object(ctx.query),
    }))
}

/// PATCH /items/:id
pub async fn update_item(ctx: RequestContext) -> HandlerResult {
    let id = ctx.params.get("id").cloned().unwrap_or(Value::Null);
    let mut changes = ctx.body;
    changes.remove("id");

    Ok(json!({
        "id": id,
        "changes": Value::Object(changes),
    }))
}
