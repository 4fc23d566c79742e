use async_trait::async_trait;

use crate::discord::{
    DiscordMember, DiscordMessage, MAX_MEMBERS_PER_PAGE, MAX_MESSAGES_PER_PAGE, Session,
    SessionError,
};

/// A remote collection read one page at a time with an item-id cursor.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    /// Largest page the service hands out.
    const MAX_PAGE_SIZE: usize;

    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Self::Item>, SessionError>;

    fn cursor_of(item: &Self::Item) -> &str;
}

/// Message history of one channel, newest first.
#[derive(Clone, Copy)]
pub struct ChannelHistory<'a> {
    session: &'a dyn Session,
    channel_id: &'a str,
}

impl<'a> ChannelHistory<'a> {
    pub fn new(session: &'a dyn Session, channel_id: &'a str) -> Self {
        Self {
            session,
            channel_id,
        }
    }
}

#[async_trait]
impl PageSource for ChannelHistory<'_> {
    type Item = DiscordMessage;

    const MAX_PAGE_SIZE: usize = MAX_MESSAGES_PER_PAGE;

    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DiscordMessage>, SessionError> {
        self.session
            .channel_messages(self.channel_id, limit, cursor)
            .await
    }

    fn cursor_of(item: &DiscordMessage) -> &str {
        &item.id
    }
}

/// Member list of one guild, ascending by user id.
#[derive(Clone, Copy)]
pub struct GuildRoster<'a> {
    session: &'a dyn Session,
    guild_id: &'a str,
}

impl<'a> GuildRoster<'a> {
    pub fn new(session: &'a dyn Session, guild_id: &'a str) -> Self {
        Self { session, guild_id }
    }
}

#[async_trait]
impl PageSource for GuildRoster<'_> {
    type Item = DiscordMember;

    const MAX_PAGE_SIZE: usize = MAX_MEMBERS_PER_PAGE;

    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DiscordMember>, SessionError> {
        self.session.guild_members(self.guild_id, cursor, limit).await
    }

    fn cursor_of(item: &DiscordMember) -> &str {
        &item.user.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The service returned an empty page.
    Exhausted,
    /// The configured item bound was reached.
    LimitReached,
}

/// Forward-only walk over a [`PageSource`].
///
/// Pages are requested at the service maximum, or at the number of items
/// still allowed under `limit` when that is smaller, so nothing past the
/// bound is fetched. After each batch the cursor moves to its last item.
///
/// Only items reported through [`PageWalker::consume`] count against the
/// limit, so items the caller passes over do not use up the budget.
pub struct PageWalker<S: PageSource> {
    source: S,
    cursor: Option<String>,
    remaining: Option<usize>,
    stop: Option<StopReason>,
}

impl<S: PageSource> PageWalker<S> {
    pub fn new(source: S, cursor: Option<String>, limit: Option<usize>) -> Self {
        Self {
            source,
            cursor,
            remaining: limit,
            stop: None,
        }
    }

    /// Why the walk ended, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// Counts `count` items of the last batch as archived.
    pub fn consume(&mut self, count: usize) {
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(count);
        }
    }

    /// Next non-empty batch, or `None` when the walk is over.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<S::Item>>, SessionError> {
        if self.stop.is_some() {
            return Ok(None);
        }

        let page_size = match self.remaining {
            Some(0) => {
                self.stop = Some(StopReason::LimitReached);
                return Ok(None);
            }
            Some(remaining) => remaining.min(S::MAX_PAGE_SIZE),
            None => S::MAX_PAGE_SIZE,
        };

        let mut batch = self
            .source
            .fetch_page(self.cursor.as_deref(), page_size)
            .await?;
        if batch.is_empty() {
            self.stop = Some(StopReason::Exhausted);
            return Ok(None);
        }
        batch.truncate(page_size);

        if let Some(last) = batch.last() {
            self.cursor = Some(S::cursor_of(last).to_string());
        }
        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::{ChannelHistory, GuildRoster, PageWalker, StopReason};
    use crate::test_support::{FakeSession, history, member};

    #[tokio::test]
    async fn cursor_follows_last_id_of_each_batch() {
        let session = FakeSession::default().with_history("100", history("100", 250));
        let mut walker = PageWalker::new(ChannelHistory::new(&session, "100"), None, None);

        let mut sizes = Vec::new();
        while let Some(batch) = walker.next_batch().await.expect("page") {
            sizes.push(batch.len());
        }

        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(walker.stop_reason(), Some(StopReason::Exhausted));
        assert_eq!(
            session.message_cursors(),
            vec![
                None,
                Some("1150".to_string()),
                Some("1050".to_string()),
                Some("1000".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn limit_shrinks_the_last_page() {
        let session = FakeSession::default().with_history("100", history("100", 500));
        let mut walker = PageWalker::new(ChannelHistory::new(&session, "100"), None, Some(150));

        let mut total = 0;
        while let Some(batch) = walker.next_batch().await.expect("page") {
            total += batch.len();
            walker.consume(batch.len());
        }

        assert_eq!(total, 150);
        assert_eq!(walker.stop_reason(), Some(StopReason::LimitReached));
        assert_eq!(session.page_sizes(), vec![100, 50]);
    }

    #[tokio::test]
    async fn starting_cursor_is_respected() {
        let session = FakeSession::default().with_history("100", history("100", 10));
        let mut walker = PageWalker::new(
            ChannelHistory::new(&session, "100"),
            Some("1004".to_string()),
            None,
        );

        let batch = walker.next_batch().await.expect("page").expect("batch");

        let ids: Vec<_> = batch.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1003", "1002", "1001", "1000"]);
        assert!(walker.next_batch().await.expect("page").is_none());
        assert_eq!(
            session.message_cursors(),
            vec![Some("1004".to_string()), Some("1000".to_string())]
        );
    }

    #[tokio::test]
    async fn unconsumed_items_leave_budget_untouched() {
        let session = FakeSession::default().with_history("100", history("100", 10));
        let mut walker = PageWalker::new(ChannelHistory::new(&session, "100"), None, Some(4));

        let passed_over = walker.next_batch().await.expect("page").expect("batch");
        let kept = walker.next_batch().await.expect("page").expect("batch");
        walker.consume(kept.len());

        assert_eq!(passed_over.len(), 4);
        assert_eq!(kept[0].id, "1005");
        assert!(walker.next_batch().await.expect("page").is_none());
        assert_eq!(walker.stop_reason(), Some(StopReason::LimitReached));
        assert_eq!(session.page_sizes(), vec![4, 4]);
    }

    #[tokio::test]
    async fn members_walk_ascending_with_after_cursor() {
        let roster = (1..=5)
            .map(|id| member("10", &id.to_string(), None))
            .collect();
        let session = FakeSession::default().with_roster("10", roster);
        let mut walker = PageWalker::new(GuildRoster::new(&session, "10"), None, Some(3));

        let batch = walker.next_batch().await.expect("page").expect("batch");
        walker.consume(batch.len());
        let ids: Vec<_> = batch.iter().map(|m| m.user.id.as_str()).collect();

        assert_eq!(ids, vec!["1", "2", "3"]);
        assert!(walker.next_batch().await.expect("page").is_none());
        assert_eq!(walker.stop_reason(), Some(StopReason::LimitReached));
        assert_eq!(session.member_cursors(), vec![None]);
    }

    #[tokio::test]
    async fn failed_page_propagates() {
        let session = FakeSession::default()
            .with_history("100", history("100", 10))
            .failing_channel("100");
        let mut walker = PageWalker::new(ChannelHistory::new(&session, "100"), None, None);

        assert!(walker.next_batch().await.is_err());
        assert_eq!(walker.stop_reason(), None);
    }
}
