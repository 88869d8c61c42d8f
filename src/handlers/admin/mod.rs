mod discounts;
mod keys;
mod transactions;

pub use discounts::*;
pub use keys::*;
pub use transactions::*;

use axum::{
    Router, middleware,
    routing::{patch, post},
};

use crate::db::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/keys", post(create_key).get(get_keys))
        .route("/admin/keys/{key}", patch(update_key).delete(delete_key))
        .route("/admin/keys/{key}/freeze", post(freeze_key))
        .route("/admin/keys/{key}/unfreeze", post(unfreeze_key))
        .route("/admin/keys/{key}/adjust", post(adjust_key))
        .route("/admin/sweep", post(sweep_keys))
        .route(
            "/admin/discounts",
            post(create_discount).get(list_discounts),
        )
        .route(
            "/admin/discounts/{id}",
            patch(update_discount).delete(delete_discount),
        )
        .route("/admin/payments/{id}/proof", post(attach_proof))
        .layer(middleware::from_fn_with_state(
            state,
            crate::middleware::admin_auth,
        ))
}
