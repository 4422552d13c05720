// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::fmt;
use std::sync::OnceLock;

use chrono::Local;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter};

use crate::common::config::LakeConfig;

static INIT: OnceLock<()> = OnceLock::new();

/// Single-line event format for the apply path:
/// `Lmmdd hh:mm:ss.uuuuuu thread file:line] message`
///
/// The thread column prefers the thread name so apply workers show up
/// by role; events without source location fall back to the tracing
/// target.
struct LakeEventFormatter;

impl<S, N> FormatEvent<S, N> for LakeEventFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let level = metadata.level().as_str().as_bytes()[0] as char;
        write!(
            writer,
            "{}{} ",
            level,
            Local::now().format("%m%d %H:%M:%S%.6f")
        )?;

        let thread = std::thread::current();
        match thread.name() {
            Some(name) if !name.is_empty() => write!(writer, "{} ", name)?,
            _ => write!(writer, "{:?} ", thread.id())?,
        }

        match (metadata.file(), metadata.line()) {
            (Some(file), Some(line)) => write!(writer, "{}:{}] ", file, line)?,
            _ => write!(writer, "{}] ", metadata.target())?,
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

pub fn init_with_filter(filter: &str) {
    INIT.get_or_init(|| {
        let env_filter = EnvFilter::new(filter);
        let _ = tracing_fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
            .event_format(LakeEventFormatter)
            .try_init();
    });
}

/// Scopes the level to this crate so embedders keep their own defaults.
pub fn init_from_config(config: &LakeConfig) {
    match config.log_filter.as_deref() {
        Some(filter) if !filter.trim().is_empty() => init_with_filter(filter),
        _ => init_with_filter(&format!("lakemeta={}", config.log_level)),
    }
}
