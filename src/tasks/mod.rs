mod handlers;
mod model;

use axum::{
    routing::{get, put},
    Router,
};

use crate::AppState;

pub use model::{NewTask, Priority, Status, Task, TaskUpdate};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_tasks).post(handlers::create_task))
        .route(
            "/{task_id}",
            get(handlers::get_task)
                .put(handlers::update_task)
                .delete(handlers::delete_task),
        )
        .route("/{task_id}/status", put(handlers::update_status))
}
