use serde_json::Value;

// Small helper: nested json lookup
fn jget<'a>(val: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = val;
    for key in path {
        cur = cur.get(*key)?;
    }
    Some(cur)
}

/// Accepts strings and numbers; remote IDs show up as both.
fn id_at(val: &Value, path: &[&str]) -> Option<String> {
    let raw = match jget(val, path)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

fn first_history_id(root: &Value, path: &[&str]) -> Option<String> {
    root.get("history_items")?
        .as_array()?
        .iter()
        .find_map(|item| id_at(item, path))
}

/// Typed view over the loosely shaped webhook bodies the router accepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookPayload {
    pub event: Option<String>,
    pub task_id: Option<String>,
    pub list_id: Option<String>,
    pub workflow: Option<String>,
}

impl WebhookPayload {
    pub fn from_value(root: &Value) -> Self {
        let task_id = id_at(root, &["task_id"])
            .or_else(|| id_at(root, &["taskId"]))
            .or_else(|| id_at(root, &["task", "id"]))
            .or_else(|| id_at(root, &["payload", "task_id"]))
            .or_else(|| id_at(root, &["payload", "task", "id"]))
            .or_else(|| first_history_id(root, &["task_id"]))
            .or_else(|| first_history_id(root, &["task", "id"]));

        let list_id = id_at(root, &["list_id"])
            .or_else(|| id_at(root, &["task", "list", "id"]))
            .or_else(|| first_history_id(root, &["list_id"]));

        let event = jget(root, &["event"])
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let workflow = jget(root, &["workflow"])
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Self {
            event,
            task_id,
            list_id,
            workflow,
        }
    }

    pub fn parse(raw_body: &[u8]) -> Option<(Self, Value)> {
        let value: Value = serde_json::from_slice(raw_body).ok()?;
        if !value.is_object() {
            return None;
        }
        Some((Self::from_value(&value), value))
    }
}
