use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::discord::Session;

type MemberKey = (String, String);

/// Per-run memo of member nicknames keyed by `(guild_id, user_id)`.
///
/// Members that could not be found are remembered as unknown and never
/// looked up again during the run.
#[derive(Debug, Default)]
pub struct NicknameCache {
    resolved: HashMap<MemberKey, Option<String>>,
    unknown: HashSet<MemberKey>,
}

impl NicknameCache {
    pub async fn resolve(
        &mut self,
        session: &dyn Session,
        guild_id: &str,
        user_id: &str,
    ) -> Option<String> {
        let key = (guild_id.to_string(), user_id.to_string());
        if let Some(nick) = self.resolved.get(&key) {
            return nick.clone();
        }
        if self.unknown.contains(&key) {
            return None;
        }

        let member = match session.cached_member(guild_id, user_id) {
            Some(member) => Some(member),
            None => match session.guild_member(guild_id, user_id).await {
                Ok(member) => Some(member),
                Err(err) => {
                    warn!(guild_id, user_id, "unknown member, archiving without nickname: {err}");
                    None
                }
            },
        };

        match member {
            Some(member) => {
                self.resolved.insert(key, member.nick.clone());
                member.nick
            }
            None => {
                self.unknown.insert(key);
                None
            }
        }
    }

    #[cfg(test)]
    pub fn is_unknown(&self, guild_id: &str, user_id: &str) -> bool {
        self.unknown
            .contains(&(guild_id.to_string(), user_id.to_string()))
    }
}
