use anyhow::{Context, Result};
use habit_core::{
    catalog::{CategoryUpdate, HabitUpdate, NewCategory, NewHabit},
    progress::ProgressUpdate,
    stack::{NewStack, StackUpdate},
    HabitError, HabitService,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

/// One request line. The `op` tag selects the operation; the remaining
/// fields are its arguments.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BridgeRequest {
    Ping,
    ListCategories,
    CreateCategory {
        category: NewCategory,
    },
    UpdateCategory {
        id: String,
        changes: CategoryUpdate,
    },
    DeleteCategory {
        id: String,
    },
    ListHabits {
        #[serde(default)]
        category: Option<String>,
    },
    GetHabit {
        id: String,
    },
    CreateHabit {
        habit: NewHabit,
    },
    UpdateHabit {
        id: String,
        changes: HabitUpdate,
    },
    DeleteHabit {
        id: String,
    },
    SearchHabits {
        query: String,
        #[serde(default)]
        category: Option<String>,
    },
    ListStacks,
    SearchStacks {
        query: String,
    },
    GetStack {
        id: String,
    },
    CreateStack {
        name: String,
        #[serde(alias = "habitIds")]
        habit_ids: Vec<String>,
    },
    UpdateStack {
        id: String,
        changes: StackUpdate,
    },
    DeleteStack {
        id: String,
    },
    ToggleHabit {
        #[serde(alias = "stackId")]
        stack_id: String,
        #[serde(alias = "habitId")]
        habit_id: String,
    },
    GetProgress {
        #[serde(alias = "stackId")]
        stack_id: String,
    },
    ListProgress,
    UpdateProgress {
        #[serde(alias = "stackId")]
        stack_id: String,
        changes: ProgressUpdate,
    },
    Snapshot,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    AlreadyExists,
    Fatal,
    BadRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl BridgeResponse {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|body| body.kind)
    }
}

pub fn ping() -> String {
    "habit-stack-bridge".to_owned()
}

/// Parses and runs one request line. Malformed input becomes a
/// `bad_request` response rather than an error.
pub fn handle_line(service: &HabitService, line: &str) -> BridgeResponse {
    match serde_json::from_str::<BridgeRequest>(line) {
        Ok(request) => dispatch(service, request),
        Err(err) => {
            warn!(error = %err, "rejected malformed request");
            BridgeResponse::failure(ErrorKind::BadRequest, err.to_string())
        }
    }
}

pub fn dispatch(service: &HabitService, request: BridgeRequest) -> BridgeResponse {
    debug!(?request, "dispatching request");
    match execute(service, request) {
        Ok(data) => BridgeResponse::success(data),
        Err(err) => {
            let kind = classify(&err);
            if kind == ErrorKind::Fatal {
                error!(error = %format!("{err:#}"), "request failed");
            } else {
                debug!(error = %format!("{err:#}"), ?kind, "request rejected");
            }
            BridgeResponse::failure(kind, format!("{err:#}"))
        }
    }
}

fn execute(service: &HabitService, request: BridgeRequest) -> Result<Value> {
    let data = match request {
        BridgeRequest::Ping => json!(ping()),
        BridgeRequest::ListCategories => to_json(service.list_categories())?,
        BridgeRequest::CreateCategory { category } => to_json(
            service
                .create_category(category)
                .context("failed to create category")?,
        )?,
        BridgeRequest::UpdateCategory { id, changes } => to_json(
            service
                .update_category(&id, changes)
                .with_context(|| format!("failed to update category {id}"))?,
        )?,
        BridgeRequest::DeleteCategory { id } => {
            service
                .delete_category(&id)
                .with_context(|| format!("failed to delete category {id}"))?;
            Value::Null
        }
        BridgeRequest::ListHabits { category } => match category {
            Some(category) => to_json(service.habits_by_category(&category))?,
            None => to_json(service.list_habits())?,
        },
        BridgeRequest::GetHabit { id } => to_json(service.get_habit(&id)?)?,
        BridgeRequest::CreateHabit { habit } => {
            to_json(service.create_habit(habit).context("failed to create habit")?)?
        }
        BridgeRequest::UpdateHabit { id, changes } => to_json(
            service
                .update_habit(&id, changes)
                .with_context(|| format!("failed to update habit {id}"))?,
        )?,
        BridgeRequest::DeleteHabit { id } => {
            service
                .delete_habit(&id)
                .with_context(|| format!("failed to delete habit {id}"))?;
            Value::Null
        }
        BridgeRequest::SearchHabits { query, category } => {
            to_json(service.search_habits(&query, category.as_deref()))?
        }
        BridgeRequest::ListStacks => to_json(service.list_stacks())?,
        BridgeRequest::SearchStacks { query } => to_json(service.search_stacks(&query))?,
        BridgeRequest::GetStack { id } => to_json(service.get_stack(&id)?)?,
        BridgeRequest::CreateStack { name, habit_ids } => to_json(
            service
                .create_stack(NewStack { name, habit_ids })
                .context("failed to create stack")?,
        )?,
        BridgeRequest::UpdateStack { id, changes } => to_json(
            service
                .update_stack(&id, changes)
                .with_context(|| format!("failed to update stack {id}"))?,
        )?,
        BridgeRequest::DeleteStack { id } => {
            service.delete_stack(&id);
            Value::Null
        }
        BridgeRequest::ToggleHabit { stack_id, habit_id } => to_json(
            service
                .toggle_habit(&stack_id, &habit_id)
                .with_context(|| format!("failed to toggle habit {habit_id} in stack {stack_id}"))?,
        )?,
        BridgeRequest::GetProgress { stack_id } => to_json(service.get_progress(&stack_id)?)?,
        BridgeRequest::ListProgress => {
            to_json(service.list_progress().context("failed to list progress")?)?
        }
        BridgeRequest::UpdateProgress { stack_id, changes } => to_json(
            service
                .update_progress(&stack_id, changes)
                .with_context(|| format!("failed to update progress for stack {stack_id}"))?,
        )?,
        BridgeRequest::Snapshot => {
            to_json(service.snapshot().context("failed to capture snapshot")?)?
        }
    };
    Ok(data)
}

fn to_json<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).context("failed to encode response")
}

fn classify(err: &anyhow::Error) -> ErrorKind {
    match err
        .chain()
        .find_map(|cause| cause.downcast_ref::<HabitError>())
    {
        Some(HabitError::Validation(_)) => ErrorKind::Validation,
        Some(HabitError::NotFound { .. }) => ErrorKind::NotFound,
        Some(HabitError::AlreadyExists { .. }) => ErrorKind::AlreadyExists,
        Some(HabitError::Fatal(_))
        | Some(HabitError::Io { .. })
        | Some(HabitError::Serialization(_))
        | None => ErrorKind::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> HabitService {
        HabitService::builder()
            .with_default_catalog()
            .build()
            .expect("seeded service")
    }

    fn ok_data(response: BridgeResponse) -> Value {
        assert!(response.ok, "unexpected failure: {:?}", response.error);
        response.data.expect("data present")
    }

    #[test]
    fn ping_answers_with_bridge_name() {
        let service = service();
        let data = ok_data(handle_line(&service, r#"{"op":"ping"}"#));
        assert_eq!(data, json!("habit-stack-bridge"));
    }

    #[test]
    fn malformed_lines_are_bad_requests() {
        let service = service();
        for line in ["not json", r#"{"op":"launch_rockets"}"#, r#"{"op":"get_stack"}"#] {
            let response = handle_line(&service, line);
            assert!(!response.ok);
            assert_eq!(response.error_kind(), Some(ErrorKind::BadRequest));
        }
    }

    #[test]
    fn create_and_toggle_through_json() {
        let service = service();
        let stack = ok_data(handle_line(
            &service,
            r#"{"op":"create_stack","name":"Morning","habitIds":["1","2"]}"#,
        ));
        let stack_id = stack["id"].as_str().expect("stack id").to_string();
        assert_eq!(stack["habits"][0]["habitId"], json!("1"));

        let toggled = ok_data(handle_line(
            &service,
            &json!({"op": "toggle_habit", "stackId": stack_id, "habitId": "1"}).to_string(),
        ));
        assert_eq!(toggled["stack"]["habits"][0]["completed"], json!(true));
        assert_eq!(toggled["progress"]["completion_rate"], json!(0.5));

        let progress = ok_data(handle_line(
            &service,
            &json!({"op": "get_progress", "stack_id": stack_id}).to_string(),
        ));
        assert_eq!(progress["current_streak"], json!(0));
    }

    #[test]
    fn domain_errors_keep_their_kind() {
        let service = service();
        let validation = handle_line(
            &service,
            r#"{"op":"create_stack","name":"S","habit_ids":["1","nope"]}"#,
        );
        assert_eq!(validation.error_kind(), Some(ErrorKind::Validation));
        assert!(service.list_stacks().is_empty());

        let missing = handle_line(
            &service,
            r#"{"op":"toggle_habit","stack_id":"ghost","habit_id":"1"}"#,
        );
        assert_eq!(missing.error_kind(), Some(ErrorKind::NotFound));
        let message = missing.error.expect("error body").message;
        assert!(message.contains("ghost"), "{message}");

        let duplicate = handle_line(
            &service,
            r##"{"op":"create_category","category":{"name":"Work","color":"#000000","icon":"x"}}"##,
        );
        assert_eq!(duplicate.error_kind(), Some(ErrorKind::AlreadyExists));
    }

    #[test]
    fn delete_stack_succeeds_for_unknown_ids() {
        let service = service();
        let response = handle_line(&service, r#"{"op":"delete_stack","id":"ghost"}"#);
        assert_eq!(response, BridgeResponse::success(Value::Null));
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"ok":true,"data":null}"#
        );
    }

    #[test]
    fn list_habits_filters_by_category() {
        let service = service();
        let data = ok_data(handle_line(
            &service,
            r#"{"op":"list_habits","category":"work"}"#,
        ));
        let names: Vec<&str> = data
            .as_array()
            .expect("array")
            .iter()
            .filter_map(|habit| habit["name"].as_str())
            .collect();
        assert_eq!(
            names,
            vec!["Check Email", "Review To-Do", "Deep Work Block", "Team Standup"]
        );
    }
}
