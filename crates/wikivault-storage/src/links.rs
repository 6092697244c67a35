use rusqlite::{params, Connection};
use wikivault_types::{Link, LinkType, StorageError};

use crate::map_sql_err;

/// Repository over the `links` table (spec §4.6, §4.9).
pub struct LinkRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LinkRepository<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Atomically replace every link owned by `source_page_id` with `links`.
    /// Called once per page whenever its latest revision is (re)stored, so a
    /// page's outbound link set always reflects only its current content
    /// (spec §4.9: a removed wikilink must disappear from the index too).
    pub fn replace_links_for_page(
        &self,
        source_page_id: u64,
        links: &[Link],
    ) -> Result<(), StorageError> {
        crate::tx::with_transaction(self.conn, || {
            self.conn
                .execute(
                    "DELETE FROM links WHERE source_page_id = ?1",
                    params![source_page_id as i64],
                )
                .map_err(map_sql_err)?;
            for link in links {
                self.conn
                    .execute(
                        "INSERT INTO links(source_page_id, target_title, link_type)
                         VALUES (?1, ?2, ?3)
                         ON CONFLICT(source_page_id, target_title, link_type) DO NOTHING",
                        params![
                            link.source_page_id as i64,
                            link.target_title,
                            link.link_type.as_str(),
                        ],
                    )
                    .map_err(map_sql_err)?;
            }
            Ok(())
        })
    }

    pub fn outbound(&self, source_page_id: u64) -> Result<Vec<Link>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT source_page_id, target_title, link_type
                 FROM links WHERE source_page_id = ?1 ORDER BY target_title",
            )
            .map_err(map_sql_err)?;
        let rows = stmt
            .query_map(params![source_page_id as i64], Self::row_to_link)
            .map_err(map_sql_err)?;
        rows.collect::<Result<Result<Vec<_>, _>, _>>()
            .map_err(map_sql_err)?
            .map_err(map_sql_err)
    }

    /// Pages linking to `target_title` with the given link kind (spec §4.9's
    /// "what links here" query shape).
    pub fn inbound(
        &self,
        target_title: &str,
        link_type: LinkType,
    ) -> Result<Vec<u64>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT source_page_id FROM links
                 WHERE target_title = ?1 AND link_type = ?2
                 ORDER BY source_page_id",
            )
            .map_err(map_sql_err)?;
        let rows = stmt
            .query_map(params![target_title, link_type.as_str()], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(map_sql_err)?;
        rows.map(|r| r.map(|id| id as u64))
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql_err)
    }

    fn row_to_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Link, StorageError>> {
        let link_type_str: String = row.get(2)?;
        let link_type = match link_type_str.parse::<LinkType>() {
            Ok(lt) => lt,
            Err(e) => return Ok(Err(StorageError::Integrity(e))),
        };
        Ok(Ok(Link {
            source_page_id: row.get::<_, i64>(0)? as u64,
            target_title: row.get(1)?,
            link_type,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageCore;
    use chrono::Utc;

    fn store_with_page(core: &StorageCore, page_id: u64) {
        core.pages()
            .upsert(&wikivault_types::Page {
                page_id,
                namespace: 0,
                title: format!("Page {page_id}"),
                is_redirect: false,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();
    }

    #[test]
    fn replace_links_for_page_drops_stale_links() {
        let core = StorageCore::open_in_memory().unwrap();
        store_with_page(&core, 1);
        core.links()
            .replace_links_for_page(
                1,
                &[
                    Link {
                        source_page_id: 1,
                        target_title: "A".to_string(),
                        link_type: LinkType::Page,
                    },
                    Link {
                        source_page_id: 1,
                        target_title: "B".to_string(),
                        link_type: LinkType::Page,
                    },
                ],
            )
            .unwrap();
        core.links()
            .replace_links_for_page(
                1,
                &[Link {
                    source_page_id: 1,
                    target_title: "A".to_string(),
                    link_type: LinkType::Page,
                }],
            )
            .unwrap();
        let outbound = core.links().outbound(1).unwrap();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].target_title, "A");
    }

    #[test]
    fn inbound_filters_by_link_type() {
        let core = StorageCore::open_in_memory().unwrap();
        store_with_page(&core, 1);
        core.links()
            .replace_links_for_page(
                1,
                &[
                    Link {
                        source_page_id: 1,
                        target_title: "Foo".to_string(),
                        link_type: LinkType::Page,
                    },
                    Link {
                        source_page_id: 1,
                        target_title: "Foo".to_string(),
                        link_type: LinkType::Category,
                    },
                ],
            )
            .unwrap();
        let pages_linking = core.links().inbound("Foo", LinkType::Page).unwrap();
        assert_eq!(pages_linking, vec![1]);
        let categories_linking = core.links().inbound("Foo", LinkType::Template).unwrap();
        assert!(categories_linking.is_empty());
    }
}
