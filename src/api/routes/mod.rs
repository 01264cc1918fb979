// Copyright (c) 2025 Rajan Panneer Selvam
//
// Licensed under the Business Source License 1.1 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.mariadb.com/bsl11
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use actix_web::web;

use crate::api::dispatch;

/// The Kinesis protocol multiplexes every operation over POST with the
/// target header, so the whole surface is one catch-all route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.default_service(web::route().to(dispatch::dispatch));
}
