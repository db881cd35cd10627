// Stepwise - Java Execution Visualizer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! One-shot trace command

use eyre::{Result, WrapErr};
use std::path::Path;
use tracing::info;

use stepwise_common::{RequestError, TraceRequest};
use stepwise_engine::{Tracer, TracerConfig};

/// Trace `file` with one input and print the trace document to stdout.
pub async fn trace_file(
    file: &Path,
    input: Option<String>,
    title: Option<String>,
    config: TracerConfig,
) -> Result<()> {
    let code = tokio::fs::read_to_string(file)
        .await
        .wrap_err_with(|| format!("Failed to read {}", file.display()))?;
    if code.trim().is_empty() {
        return Err(RequestError::MissingCode.into());
    }

    let request = TraceRequest::single(code, title, input);
    let document = Tracer::new(config).trace_document(&request).await?;
    info!(steps = document.inputs.first().map_or(0, |input| input.trace.len()), "trace complete");

    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}
