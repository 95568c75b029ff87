use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar for a known unit count.
pub fn bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::with_template("{msg:20!} [{bar:40}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

/// Spinner for streamed inputs with no known total.
pub fn spinner() -> ProgressBar {
    ProgressBar::new_spinner()
}

/// Tick `pb` once per item and clear it when the iterator is exhausted.
pub fn wrap<I: Iterator>(mut iter: I, pb: ProgressBar) -> impl Iterator<Item = I::Item> {
    std::iter::from_fn(move || match iter.next() {
        Some(item) => {
            pb.inc(1);
            Some(item)
        }
        None => {
            pb.finish_and_clear();
            None
        }
    })
}
