// SPDX-License-Identifier: MIT
//
// Service layer — wires the backend crates together for the host shell.

pub mod app_services;
pub mod data_dir;
