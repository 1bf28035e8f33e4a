/// Plain-text layout of tables, trees, listings and stack traces
use crossterm::style::Stylize;
use unicode_width::UnicodeWidthStr;

use crate::debugger::{StackEntry, Variable};

fn pad_right(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("{text}{}", " ".repeat(fill))
}

fn center(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    let left = fill / 2;
    format!("{}{text}{}", " ".repeat(left), " ".repeat(fill - left))
}

/// Command names laid out in as many columns as fit in `console_width`.
///
/// Items run down the columns first, like `ls`.
pub fn topics(header: &str, cmds: &[String], console_width: usize) -> String {
    let mut out = format!("{}\n", header.cyan().bold().italic());
    if cmds.is_empty() {
        return out;
    }

    let max_item = cmds.iter().map(|c| c.width()).max().unwrap_or(0);
    let column_width = max_item + 2;
    let num_columns = ((console_width + 1) / (column_width + 3)).max(1).min(cmds.len());
    let num_rows = cmds.len().div_ceil(num_columns);

    for row in 0..num_rows {
        let cells: Vec<String> = (0..num_columns)
            .map(|col| {
                let item = cmds.get(row + col * num_rows).map(String::as_str).unwrap_or("");
                center(item, column_width).yellow().to_string()
            })
            .collect();
        out.push_str(cells.join("   ").trim_end());
        out.push('\n');
    }
    out
}

/// `Variable | Value | Type` table, `None` when nothing is visible
pub fn variables_table(variables: &[Variable]) -> Option<String> {
    let visible: Vec<&Variable> = variables.iter().filter(|v| !v.is_hidden()).collect();
    if visible.is_empty() {
        return None;
    }

    let headers = ["Variable", "Value", "Type"];
    let mut widths = headers.map(|h| h.width());
    for v in &visible {
        widths[0] = widths[0].max(v.name.width());
        widths[1] = widths[1].max(v.value.width());
        widths[2] = widths[2].max(v.type_name.width());
    }

    let total = widths.iter().sum::<usize>() + 6;
    let mut out = format!("{}\n", center("List of local variables", total).italic());
    out.push_str(&format!(
        " {} │ {} │ {}\n",
        pad_right(headers[0], widths[0]).bold(),
        pad_right(headers[1], widths[1]).bold(),
        pad_right(headers[2], widths[2]).bold()
    ));
    out.push_str(&format!(
        "─{}─┼─{}─┼─{}─\n",
        "─".repeat(widths[0]),
        "─".repeat(widths[1]),
        "─".repeat(widths[2])
    ));
    for v in visible {
        out.push_str(&format!(
            " {} │ {} │ {}\n",
            pad_right(&v.name, widths[0]).cyan(),
            pad_right(&v.value, widths[1]).magenta(),
            pad_right(&v.type_name, widths[2]).green()
        ));
    }
    Some(out)
}

/// Variables grouped under their type, both levels sorted
pub fn variables_tree(variables: &[Variable]) -> Option<String> {
    let mut visible: Vec<&Variable> = variables.iter().filter(|v| !v.is_hidden()).collect();
    if visible.is_empty() {
        return None;
    }
    visible.sort_by(|a, b| (&a.type_name, &a.name).cmp(&(&b.type_name, &b.name)));

    let mut groups: Vec<(&str, Vec<&Variable>)> = Vec::new();
    for v in visible {
        match groups.last_mut() {
            Some((type_name, members)) if *type_name == v.type_name => members.push(v),
            _ => groups.push((v.type_name.as_str(), vec![v])),
        }
    }

    let mut out = String::from("Variables\n");
    let group_count = groups.len();
    for (i, (type_name, members)) in groups.into_iter().enumerate() {
        let last_group = i + 1 == group_count;
        let (branch, indent) = if last_group { ("└── ", "    ") } else { ("├── ", "│   ") };
        out.push_str(&format!("{branch}{}\n", type_name.green().bold()));
        let member_count = members.len();
        for (j, v) in members.into_iter().enumerate() {
            let leaf = if j + 1 == member_count { "└── " } else { "├── " };
            out.push_str(&format!("{indent}{leaf}{}\n", format!("{}: {}", v.name, v.value).magenta()));
        }
    }
    Some(out)
}

/// Numbered listing of `lines`, which start at line `first`; `current` is marked
pub fn source_listing(lines: &[String], first: usize, current: Option<usize>) -> String {
    let last = first + lines.len().saturating_sub(1);
    let number_width = last.to_string().len();
    let mut out = String::new();
    for (offset, line) in lines.iter().enumerate() {
        let lineno = first + offset;
        let number = format!("{lineno:>number_width$}");
        if Some(lineno) == current {
            out.push_str(&format!("{} {} {}\n", "->".red().bold(), number.bold(), line));
        } else {
            out.push_str(&format!("   {} {}\n", number.dark_grey(), line));
        }
    }
    out
}

/// One frame in traceback form
pub fn stack_entry(entry: &StackEntry) -> String {
    format!(
        "  File {}, line {}, in {}\n",
        format!("\"{}\"", entry.filename).cyan(),
        entry.lineno.to_string().cyan(),
        entry.function.as_str().green()
    )
}

/// Frames oldest first, like a traceback
pub fn stack_trace(entries: &[StackEntry]) -> String {
    let mut out = format!("{}\n", "Traceback (most recent call last):".red().bold());
    for entry in entries {
        out.push_str(&stack_entry(entry));
    }
    out
}
