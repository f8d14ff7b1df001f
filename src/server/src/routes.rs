//! HTTP route table (spec.md §6.2).

use actix_web::web;

use crate::controllers::{blocks, commits, fs_objects, permission, protocol};

pub fn configure(cfg: &mut web::ServiceConfig) {
    protocol::configure(cfg);
    permission::configure(cfg);
    commits::configure(cfg);
    fs_objects::configure(cfg);
    blocks::configure(cfg);
}
