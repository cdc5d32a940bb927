// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Parallel execution engine: command fan-out, output streams, file
//! transfers and the join barrier.

pub mod dispatcher;
pub mod join;
pub mod output;
pub mod result_types;
pub mod template;
pub mod transfer;

pub use dispatcher::{render_commands, wrap_sudo, CommandDispatcher, RunOptions};
pub use join::{join, Joinable};
pub use output::{OutputHandle, StdinWriter};
pub use result_types::{HostOutput, RunOutput, TransferTask};
pub use template::{CommandTemplate, HostArgs, TemplateError};
pub use transfer::{download_path, TransferEngine, DEFAULT_SUFFIX_SEPARATOR};
