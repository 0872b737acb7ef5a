//! `sl refs validate` - check inline references against locked aliases.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use specledger_core::{parse_references, Lockfile, ReferenceValidator, ValidationError};

use crate::cli::args::RefsValidateArgs;
use crate::cli::project::Project;
use crate::exit_codes::{CHECK_FAILED, SUCCESS};

fn should_skip_recursive_dir(name: &str) -> bool {
    name.starts_with('.') || name == "node_modules" || name == "target"
}

fn collect_documents_inner(
    root: &Path,
    dir: &Path,
    include: &globset::GlobSet,
    out: &mut Vec<PathBuf>,
) -> Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry?;
        let p = entry.path();
        let ft = entry.file_type()?;
        if ft.is_dir() {
            let name = p.file_name().and_then(|s| s.to_str()).unwrap_or("");
            if should_skip_recursive_dir(name) {
                continue;
            }
            collect_documents_inner(root, &p, include, out)?;
        } else if ft.is_file() {
            let relative = p.strip_prefix(root).unwrap_or(&p);
            if include.is_match(relative) {
                out.push(p);
            }
        }
    }
    Ok(())
}

fn collect_documents(root: &Path, include: &str) -> Result<Vec<PathBuf>> {
    let glob = globset::Glob::new(include).with_context(|| format!("invalid glob: {}", include))?;
    let set = globset::GlobSetBuilder::new().add(glob).build()?;

    let mut out = Vec::new();
    if root.is_dir() {
        collect_documents_inner(root, root, &set, &mut out)?;
    }
    out.sort();
    Ok(out)
}

struct DocumentReport {
    path: PathBuf,
    references: usize,
    errors: Vec<ValidationError>,
}

pub async fn cmd_validate(dir: Option<&Path>, args: RefsValidateArgs) -> Result<i32> {
    let project = Project::from_cli(dir)?;
    let lockfile_path = project.lockfile_path();
    let lockfile = Lockfile::read(&lockfile_path)
        .await
        .with_context(|| "no usable lockfile; run `sl deps resolve` first")?;
    let validator = ReferenceValidator::from_lockfile(&lockfile);

    let files = if args.files.is_empty() {
        collect_documents(&project.specs_dir(), &args.include)?
    } else {
        args.files.clone()
    };

    let mut reports = Vec::with_capacity(files.len());
    for path in files {
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let references = parse_references(&text);
        let errors = validator.validate(&references);
        reports.push(DocumentReport {
            path,
            references: references.len(),
            errors,
        });
    }

    let error_count: usize = reports.iter().map(|r| r.errors.len()).sum();

    if args.json {
        let docs: Vec<serde_json::Value> = reports
            .iter()
            .map(|r| {
                serde_json::json!({
                    "file": r.path.display().to_string(),
                    "references": r.references,
                    "errors": r.errors,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&docs)?);
    } else {
        for report in &reports {
            for error in &report.errors {
                println!(
                    "{}:{}: {} ({})",
                    report.path.display(),
                    error.position,
                    error.message,
                    error.reference
                );
            }
        }
        eprintln!(
            "Checked {} file(s), {} reference(s): {} unknown",
            reports.len(),
            reports.iter().map(|r| r.references).sum::<usize>(),
            error_count
        );
    }

    Ok(if error_count == 0 { SUCCESS } else { CHECK_FAILED })
}
