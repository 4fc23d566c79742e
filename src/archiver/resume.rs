use tracing::debug;

use super::ArchiveError;
use super::pagination::PageSource;

/// Id of the `count`-th item in walk order, used as the cursor that skips
/// the first `count` items. Only one page is held at a time.
///
/// Returns `None` for a zero count.
pub async fn locate_resume_cursor<S: PageSource>(
    source: &S,
    count: usize,
) -> Result<Option<String>, ArchiveError> {
    if count == 0 {
        return Ok(None);
    }

    let mut cursor: Option<String> = None;
    let mut remaining = count;

    loop {
        let page_size = remaining.min(S::MAX_PAGE_SIZE);
        let page = source.fetch_page(cursor.as_deref(), page_size).await?;

        if page.len() >= remaining {
            let id = S::cursor_of(&page[remaining - 1]).to_string();
            debug!("skipping {} items, resuming after {}", count, id);
            return Ok(Some(id));
        }

        let Some(last) = page.last() else {
            return Err(ArchiveError::SequenceTooShort {
                requested: count,
                available: count - remaining,
            });
        };
        remaining -= page.len();
        cursor = Some(S::cursor_of(last).to_string());
    }
}
