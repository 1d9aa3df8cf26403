pub mod helpers;
pub mod hooks;
pub mod pipelines;
pub mod secrets;

use axum::Router;

use crate::store::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(hooks::router())
        .merge(pipelines::router())
        .merge(secrets::router())
}
