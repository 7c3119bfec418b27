use super::parse_uuid;
use crate::error::Error;
use tome_catalog::Author;

#[derive(sqlx::FromRow)]
pub(crate) struct AuthorRow {
    pub(crate) id: String,
    pub(crate) name: String,
}
impl From<&Author> for AuthorRow {
    fn from(author: &Author) -> Self {
        Self { id: author.id.to_string(), name: author.name.clone() }
    }
}
impl TryFrom<AuthorRow> for Author {
    type Error = Error;
    fn try_from(row: AuthorRow) -> Result<Self, Self::Error> {
        Ok(Self { id: parse_uuid(&row.id, "author id")?, name: row.name })
    }
}
