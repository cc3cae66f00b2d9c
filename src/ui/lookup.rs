use anyhow::Result;
use std::io::{self, Write};
use std::time::Duration;

use super::{Spinner, Style};
use crate::orchestrator::{Lookup, LookupEvent};
use crate::status;

/// How a printed lookup ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Completed { from_cache: bool },
    Failed(String),
    /// Another lookup took over before this one finished.
    Superseded,
}

/// Streams a lookup to stdout, with a spinner until the first text arrives.
pub async fn print_lookup(lookup: &mut Lookup, topic: &str) -> Result<LookupOutcome> {
    let spinner = Spinner::new(&format!("Looking up {topic}..."));
    let mut printed = false;

    while let Some(event) = lookup.next_event().await {
        spinner.stop();
        match event {
            LookupEvent::Fragment { text, .. } => {
                print!("{text}");
                io::stdout().flush()?;
                printed = true;
            }
            LookupEvent::Completed {
                text,
                elapsed,
                from_cache,
            } => {
                if !printed {
                    print!("{text}");
                }
                println!();
                status!("{}", Style::hint(elapsed_label(elapsed, from_cache)));
                return Ok(LookupOutcome::Completed { from_cache });
            }
            LookupEvent::Failed(message) => {
                if printed {
                    println!();
                }
                return Ok(LookupOutcome::Failed(message));
            }
        }
    }

    spinner.stop();
    if printed {
        println!();
    }
    Ok(LookupOutcome::Superseded)
}

fn elapsed_label(elapsed: Duration, from_cache: bool) -> String {
    let seconds = elapsed.as_secs_f64();
    if from_cache {
        format!("({seconds:.1}s, cached)")
    } else {
        format!("({seconds:.1}s)")
    }
}
