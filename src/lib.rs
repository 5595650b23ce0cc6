// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

pub mod accumulator;
pub mod config;
pub mod frame;
pub mod part;
pub mod proxy;
pub mod stream;
pub mod upstream;
