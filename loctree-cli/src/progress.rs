use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use loctree::{Progress, RunContext};

/// Progress bar on stderr for long scans and imports. Hidden when `enabled`
/// is false (JSON output, `--quiet`) and when stderr is not a terminal.
pub fn progress_bar(enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} files {wide_msg}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

/// Wires `bar` into the context's progress callback.
pub fn attach(ctx: RunContext, bar: &ProgressBar) -> RunContext {
    let bar = bar.clone();
    ctx.with_progress(move |p: Progress| {
        bar.set_length(p.total as u64);
        bar.set_position(p.current as u64);
    })
}
