//! Shared process state handed to every request handler (spec.md §9
//! "pass a context / engine struct explicitly").

use std::sync::Arc;

use actix_web::web;
use syncwerk::Engine;

pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn data(engine: Arc<Engine>) -> web::Data<Self> {
        web::Data::new(AppState { engine })
    }
}
