use crate::file_patcher::PatchPreview;
use colored::*;
use similar::{ChangeTag, TextDiff};
use std::io::IsTerminal;

pub struct DiffFormatter;

impl DiffFormatter {
    /// Auto-detect if we should use colors
    fn should_use_color() -> bool {
        // Check NO_COLOR env var (https://no-color.org/)
        if std::env::var("NO_COLOR").is_ok() {
            return false;
        }

        std::io::stdout().is_terminal()
    }

    /// Header printed before dry-run previews
    pub fn format_dry_run_header(operation: &str) -> String {
        if Self::should_use_color() {
            format!("{} {}\n", "Dry run:".bold().yellow(), operation)
        } else {
            format!("Dry run: {}\n", operation)
        }
    }

    /// Format a patch preview as changed lines with `context_size` lines around them
    pub fn format_preview(preview: &PatchPreview, context_size: usize) -> String {
        Self::render(preview, context_size, Self::should_use_color())
    }

    fn render(preview: &PatchPreview, context_size: usize, use_color: bool) -> String {
        let mut output = String::new();
        let path = preview.path.display().to_string();

        if use_color {
            output.push_str(&format!("{}\n", path.bold().cyan()));
        } else {
            output.push_str(&format!("{}\n", path));
        }

        // Files need not be UTF-8; invalid sequences only affect the display.
        let original = String::from_utf8_lossy(&preview.original);
        let patched = String::from_utf8_lossy(&preview.patched);
        let diff = TextDiff::from_lines(&*original, &*patched);
        let mut added = 0usize;
        let mut deleted = 0usize;

        for (group_idx, group) in diff.grouped_ops(context_size).iter().enumerate() {
            if group_idx > 0 {
                if use_color {
                    output.push_str(&format!("{}\n", "...".dimmed()));
                } else {
                    output.push_str("...\n");
                }
            }

            for op in group {
                for change in diff.iter_changes(op) {
                    let content = change.value().trim_end_matches(['\n', '\r']);
                    let (indicator, line_num) = match change.tag() {
                        ChangeTag::Equal => ("=", change.new_index()),
                        ChangeTag::Insert => {
                            added += 1;
                            ("+", change.new_index())
                        }
                        ChangeTag::Delete => {
                            deleted += 1;
                            ("-", change.old_index())
                        }
                    };
                    let line_num = line_num.map(|n| n + 1).unwrap_or(0);

                    if use_color {
                        let colored_line = match change.tag() {
                            ChangeTag::Equal => format!("L{}: {} {}\n", line_num, indicator.dimmed(), content.dimmed()),
                            ChangeTag::Insert => format!("L{}: {} {}\n", line_num, indicator.green().bold(), content.green().bold()),
                            ChangeTag::Delete => format!("L{}: {} {}\n", line_num, indicator.red().bold(), content.red()),
                        };
                        output.push_str(&colored_line);
                    } else {
                        output.push_str(&format!("L{}: {} {}\n", line_num, indicator, content));
                    }
                }
            }
        }

        // Summary
        if use_color {
            output.push_str(&format!(
                "\nTotal: {} added, {} deleted\n",
                added.to_string().green(),
                deleted.to_string().red()
            ));
        } else {
            output.push_str(&format!("\nTotal: {} added, {} deleted\n", added, deleted));
        }

        output
    }
}
