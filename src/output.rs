//! Terminal formatting for search results

use sheaf::{RecordType, SearchHit, SearchResults};
use std::collections::HashSet;
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn stdout(color: bool) -> StandardStream {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Print hits as `type.id score` headers followed by their text, with query
/// terms highlighted
pub fn print_hits(results: &SearchResults, terms: &[String], color: bool, show_fields: bool) -> io::Result<()> {
    let mut stdout = stdout(color);
    let terms: HashSet<&str> = terms.iter().map(String::as_str).collect();

    for (i, hit) in results.results.iter().enumerate() {
        if i > 0 {
            writeln!(stdout)?;
        }
        print_header(&mut stdout, hit)?;

        for line in hit.text.lines() {
            write!(stdout, "  ")?;
            print_highlighted(&mut stdout, line, &terms)?;
            writeln!(stdout)?;
        }

        if show_fields {
            for (name, value) in &hit.fields {
                stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
                write!(stdout, "  {}", name)?;
                stdout.reset()?;
                writeln!(stdout, " = {}", value)?;
            }
        }
    }

    if results.hits > results.results.len() {
        writeln!(stdout)?;
        writeln!(stdout, "({} of {} hits shown)", results.results.len(), results.hits)?;
    }

    Ok(())
}

fn print_header(stdout: &mut StandardStream, hit: &SearchHit) -> io::Result<()> {
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
    write!(stdout, "{}", hit.id)?;
    stdout.reset()?;
    write!(stdout, " ")?;
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
    writeln!(stdout, "{:.3}", hit.score)?;
    stdout.reset()?;
    Ok(())
}

/// Write a line, coloring each word that is one of the query terms
fn print_highlighted(stdout: &mut StandardStream, line: &str, terms: &HashSet<&str>) -> io::Result<()> {
    let mut start = 0;
    let mut in_word = false;

    for (pos, ch) in line.char_indices().chain(std::iter::once((line.len(), ' '))) {
        let is_word = ch.is_alphanumeric();
        if is_word == in_word {
            continue;
        }
        if start < pos {
            write_run(stdout, &line[start..pos], in_word && terms.contains(line[start..pos].to_lowercase().as_str()))?;
        }
        start = pos;
        in_word = is_word;
    }

    Ok(())
}

fn write_run(stdout: &mut StandardStream, run: &str, highlight: bool) -> io::Result<()> {
    if highlight {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        write!(stdout, "{}", run)?;
        stdout.reset()
    } else {
        write!(stdout, "{}", run)
    }
}

/// Print results as pretty JSON
pub fn print_json(results: &SearchResults) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, results)?;
    writeln!(stdout)
}

/// Print `type:count` lines (for count --by-model)
pub fn print_type_counts(counts: &[(RecordType, usize)], color: bool) -> io::Result<()> {
    let mut stdout = stdout(color);

    for (record_type, count) in counts {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
        write!(stdout, "{}", record_type)?;
        stdout.reset()?;
        write!(stdout, ":")?;
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        writeln!(stdout, "{}", count)?;
        stdout.reset()?;
    }

    Ok(())
}
