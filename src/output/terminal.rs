use crate::package::ExtensionPackage;
use crate::search::{SearchMatch, SearchOutcome};
use crate::tree::{FileTree, NodeId};
use crate::unpack::PackageFormat;
use colored::*;

pub fn print_package_info(package: &ExtensionPackage) {
    print_header(package);
    print_permissions_section(package);
    print_contents_section(package.tree());
}

fn print_header(package: &ExtensionPackage) {
    println!("{}", "┌─────────────────────────────────────────────────────────────┐".bright_black());

    let manifest = package.manifest().ok();
    let name = manifest.map(|m| m.name.as_str()).unwrap_or("Unknown Extension");
    println!("│  Extension: {:<48}│", name.bold());

    let id = package
        .extension_id()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("│  ID: {:<55}│", id);

    let version = manifest.map(|m| m.version.as_str()).unwrap_or("?");
    let manifest_v = manifest
        .map(|m| format!("Manifest V{}", m.manifest_version))
        .unwrap_or_else(|| "?".to_string());
    let format = match package.format() {
        PackageFormat::Crx2 => "CRX2",
        PackageFormat::Crx3 => "CRX3",
        PackageFormat::Zip => "ZIP",
        PackageFormat::Unknown => "?",
    };

    println!("│  Version: {} │ {} │ {:<26}│", version, manifest_v, format);
    println!("{}", "└─────────────────────────────────────────────────────────────┘".bright_black());
    println!();

    if let Some(description) = manifest.and_then(|m| m.description.as_deref()) {
        for line in textwrap::wrap(description, 60) {
            println!("  {}", line.bright_black());
        }
        println!();
    }

    if let Err(e) = package.manifest() {
        println!("  {} {}", "⚠".yellow(), e.to_string().yellow());
        println!();
    }
}

fn print_permissions_section(package: &ExtensionPackage) {
    let Ok(manifest) = package.manifest() else {
        return;
    };
    if manifest.permissions.is_empty() {
        return;
    }

    println!("{}", "── Permissions ──────────────────────────────────────────────".bright_black());

    let hosts = manifest.host_permissions();
    for permission in &manifest.permissions {
        if hosts.contains(permission) {
            println!("  {} {}", "●".yellow(), permission.yellow());
        } else {
            println!("  {} {}", "●".blue(), permission);
        }
    }

    println!();
}

fn print_contents_section(tree: &FileTree) {
    println!("{}", "── Contents ─────────────────────────────────────────────────".bright_black());
    println!(
        "  {} files, {}",
        tree.file_count().to_string().bold(),
        format_size(tree.total_size())
    );

    if !tree.collisions().is_empty() {
        println!(
            "  {} {} duplicate paths (last entry kept)",
            "⚠".yellow(),
            tree.collisions().len()
        );
    }
    for skipped in tree.skipped() {
        println!("  {} {}: {}", "⚠".yellow(), skipped.path, skipped.reason.bright_black());
    }

    println!();
}

pub fn print_tree(tree: &FileTree) {
    println!("{}", "/".bold());
    print_children(tree, tree.root(), "");
    println!();
    println!(
        "{}",
        format!("{} files, {}", tree.file_count(), format_size(tree.total_size())).bright_black()
    );
}

fn print_children(tree: &FileTree, id: NodeId, prefix: &str) {
    let children = &tree.node(id).children;
    for (i, &child) in children.iter().enumerate() {
        let node = tree.node(child);
        let last = i + 1 == children.len();
        let branch = if last { "└── " } else { "├── " };

        if node.is_directory {
            println!("{}{}{}", prefix, branch, format!("{}/", node.name).blue().bold());
            let next = format!("{}{}", prefix, if last { "    " } else { "│   " });
            print_children(tree, child, &next);
        } else {
            println!(
                "{}{}{} {}",
                prefix,
                branch,
                node.name,
                format_size(node.size).bright_black()
            );
        }
    }
}

pub fn print_search_outcome(outcome: &SearchOutcome) {
    for result in &outcome.results {
        println!("{}", result.file_path.magenta().bold());
        for m in &result.matches {
            print_match(m);
        }
        println!();
    }

    let stats = &outcome.stats;
    let mut summary = format!(
        "{} matches in {} files ({} scanned",
        stats.total_matches,
        outcome.results.len(),
        stats.files_scanned
    );
    if stats.files_skipped_binary > 0 {
        summary.push_str(&format!(", {} binary skipped", stats.files_skipped_binary));
    }
    if !stats.files_failed.is_empty() {
        summary.push_str(&format!(", {} unreadable", stats.files_failed.len()));
    }
    summary.push(')');
    println!("{}", summary.bright_black());

    for failed in &stats.files_failed {
        println!("  {} {}: {}", "⚠".yellow(), failed.path, failed.reason.bright_black());
    }
    if outcome.cancelled {
        println!("{}", "Search cancelled, results are incomplete".yellow());
    }
}

fn print_match(m: &SearchMatch) {
    let first = m.line - m.lines_before.len();
    for (i, line) in m.lines_before.iter().enumerate() {
        println!("  {:>6}  {}", (first + i).to_string().bright_black(), line.bright_black());
    }
    println!(
        "  {:>6}: {}",
        format!("{}:{}", m.line, m.column).green(),
        m.matched_text.red().bold()
    );
    for (i, line) in m.lines_after.iter().enumerate() {
        println!("  {:>6}  {}", (m.line + 1 + i).to_string().bright_black(), line.bright_black());
    }
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
