//! Management commands over the metric registry and synchronizer.
//!
//! Each command is a plain function taking the registry and an output
//! writer, returning the process exit code; `main` only does argument
//! parsing and dispatch. Check failures are collected per metric type and
//! summarized, never aborting the remaining batch.

use std::io::Write;

use anyhow::{anyhow, Result};
use shared::registry::Registry;
use shared::template::CheckError;

fn resolve_namespaces(registry: &Registry, namespace: Option<&str>) -> Result<Vec<String>> {
    match namespace {
        Some(namespace) => {
            if !registry.contains_namespace(namespace) {
                return Err(anyhow!("No metrics found for namespace '{namespace}'"));
            }
            Ok(vec![namespace.to_string()])
        }
        None => Ok(registry.namespaces()?),
    }
}

/// Pretty-prints a listing of all registered metrics.
///
/// # Errors
///
/// Returns an error if the namespace filter is unknown or output fails.
pub fn show_metrics(
    registry: &Registry,
    namespace: Option<&str>,
    out: &mut dyn Write,
) -> Result<i32> {
    for namespace in resolve_namespaces(registry, namespace)? {
        writeln!(out, "Metrics for '{namespace}':")?;
        for metric in registry.metrics(Some(namespace.as_str()))? {
            writeln!(
                out,
                "  {} -> {} ({})",
                metric.name(),
                metric.template_name(),
                metric.template_pattern()
            )?;
        }
    }
    Ok(0)
}

/// Checks that every registered metric has an up-to-date index template in
/// the store. Missing and drifted templates are reported per type; the
/// batch always runs to completion.
///
/// Returns 1 if any metric was missing or out of sync, 0 otherwise.
///
/// # Errors
///
/// Returns an error if the namespace filter is unknown, the store cannot
/// be reached at all, or output fails.
pub fn check_metrics(
    registry: &Registry,
    namespace: Option<&str>,
    connection: Option<&str>,
    out: &mut dyn Write,
) -> Result<i32> {
    let namespaces = resolve_namespaces(registry, namespace)?;
    let mut out_of_sync_count = 0u32;

    writeln!(out, "Checking for outdated index templates...")?;
    for namespace in namespaces {
        for metric in registry.metrics(Some(namespace.as_str()))? {
            match metric.check_index_template(connection) {
                Ok(()) => {}
                Err(error @ (CheckError::TemplateNotFound { .. } | CheckError::OutOfSync { .. })) => {
                    writeln!(out, "  {error}")?;
                    out_of_sync_count += 1;
                }
                // Transport failures abort the batch unchanged.
                Err(CheckError::Store(error)) => return Err(error.into()),
            }
        }
    }

    if out_of_sync_count > 0 {
        writeln!(out, "{out_of_sync_count} index template(s) out of sync.")?;
        writeln!(out, "Run `tidemark sync-metrics` to synchronize.")?;
        Ok(1)
    } else {
        writeln!(out, "All metrics in sync.")?;
        Ok(0)
    }
}

/// Creates or updates the index template for every registered metric.
/// Idempotent: re-running against an in-sync store is a no-op upsert.
///
/// # Errors
///
/// Returns an error if the namespace filter is unknown, the store rejects
/// an upsert, or output fails.
pub fn sync_metrics(
    registry: &Registry,
    namespace: Option<&str>,
    connection: Option<&str>,
    out: &mut dyn Write,
) -> Result<i32> {
    let namespaces = resolve_namespaces(registry, namespace)?;
    let mut synced = 0u32;

    writeln!(out, "Syncing index templates...")?;
    for namespace in namespaces {
        for metric in registry.metrics(Some(namespace.as_str()))? {
            let template = metric.sync_index_template(connection)?;
            writeln!(out, "  {} -> {}", metric.name(), template.name)?;
            synced += 1;
        }
    }
    writeln!(out, "Synchronized {synced} metric(s).")?;
    Ok(0)
}
