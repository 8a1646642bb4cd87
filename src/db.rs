use futures::future::BoxFuture;
use uuid::Uuid;

use crate::bhajan::{Bhajan, BhajanPatch, NewBhajan};
use crate::errors::RepositoryError;

pub mod memory;

/// Durable storage for bhajan records.
pub trait Repository: Send + Sync {
    /// Saves a new record, assigning its ID, counters and creation time.
    fn create(&self, bhajan: NewBhajan) -> BoxFuture<'_, Result<Bhajan, RepositoryError>>;

    fn find_by_id(&self, id: &Uuid) -> BoxFuture<'_, Result<Bhajan, RepositoryError>>;

    /// Every record, newest first.
    fn find_all(&self) -> BoxFuture<'_, Result<Vec<Bhajan>, RepositoryError>>;

    /// Applies `patch` to the stored record and re-validates it.
    fn update_by_id(
        &self,
        id: &Uuid,
        patch: BhajanPatch,
    ) -> BoxFuture<'_, Result<Bhajan, RepositoryError>>;

    /// Removes the record, returning what was removed.
    fn delete_by_id(&self, id: &Uuid) -> BoxFuture<'_, Result<Bhajan, RepositoryError>>;

    /// Checks that the repository is reachable.
    fn ping(&self) -> BoxFuture<'_, Result<(), RepositoryError>>;
}

pub use self::postgres::*;

mod postgres {
    use std::convert::TryFrom;

    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::{
        self,
        postgres::{PgArguments, PgPool, PgRow},
        query::Query,
        Postgres,
    };
    use time::OffsetDateTime;
    use url::Url;
    use uuid::Uuid;

    use crate::bhajan::{AssetReferences, Bhajan, BhajanDetails, BhajanPatch, NewBhajan};
    use crate::errors::RepositoryError;

    const CONSTRAINT_MESSAGES: &[(&str, &str)] = &[
        ("bhajans_title_not_empty", "title must not be empty"),
        ("bhajans_artist_not_empty", "artist must not be empty"),
        ("bhajans_language_not_empty", "language must not be empty"),
        ("bhajans_duration_not_negative", "duration must not be negative"),
        ("bhajans_release_year_range", "releaseYear is out of range"),
    ];

    pub struct PgRepository {
        pool: PgPool,
    }

    impl PgRepository {
        pub fn new(pool: PgPool) -> Self {
            PgRepository { pool }
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Repository for PgRepository {
        fn create(&self, bhajan: NewBhajan) -> BoxFuture<'_, Result<Bhajan, RepositoryError>> {
            async move {
                let NewBhajan { details, assets } = bhajan;
                details.validate().map_err(RepositoryError::Validation)?;

                let query = bind_columns(
                    sqlx::query(include_str!("queries/create.sql")),
                    &details,
                    &assets,
                )?;

                let (id, views, likes, created_at) = query
                    .try_map(|row: PgRow| {
                        let id: Uuid = try_get(&row, "id")?;
                        let views: i64 = try_get(&row, "views")?;
                        let likes: i64 = try_get(&row, "likes")?;
                        let created_at: OffsetDateTime = try_get(&row, "created_at")?;

                        Ok((id, views, likes, created_at))
                    })
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(Bhajan::new(id, details, assets, views, likes, created_at))
            }
            .boxed()
        }

        fn find_by_id(&self, id: &Uuid) -> BoxFuture<'_, Result<Bhajan, RepositoryError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/retrieve.sql"));

                query
                    .bind(id)
                    .try_map(|row: PgRow| bhajan_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .ok_or(RepositoryError::NotFound(id))
            }
            .boxed()
        }

        fn find_all(&self) -> BoxFuture<'_, Result<Vec<Bhajan>, RepositoryError>> {
            async move {
                let query = sqlx::query(include_str!("queries/retrieve_all.sql"));

                let bhajans = query
                    .try_map(|row: PgRow| bhajan_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(bhajans)
            }
            .boxed()
        }

        fn update_by_id(
            &self,
            id: &Uuid,
            patch: BhajanPatch,
        ) -> BoxFuture<'_, Result<Bhajan, RepositoryError>> {
            let id = *id;

            async move {
                // dropping the transaction on an early return rolls it back
                let mut transaction = self.pool.begin().await.map_err(map_sqlx_error)?;

                let mut bhajan = sqlx::query(include_str!("queries/lock.sql"))
                    .bind(id)
                    .try_map(|row: PgRow| bhajan_from_row(&row))
                    .fetch_optional(&mut transaction)
                    .await
                    .map_err(map_sqlx_error)?
                    .ok_or(RepositoryError::NotFound(id))?;

                bhajan.patch(&patch).map_err(RepositoryError::Validation)?;

                let query = sqlx::query(include_str!("queries/update.sql")).bind(id);
                bind_columns(query, bhajan.details(), bhajan.assets())?
                    .execute(&mut transaction)
                    .await
                    .map_err(map_sqlx_error)?;

                transaction.commit().await.map_err(map_sqlx_error)?;

                Ok(bhajan)
            }
            .boxed()
        }

        fn delete_by_id(&self, id: &Uuid) -> BoxFuture<'_, Result<Bhajan, RepositoryError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/delete.sql"));

                query
                    .bind(id)
                    .try_map(|row: PgRow| bhajan_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .ok_or(RepositoryError::NotFound(id))
            }
            .boxed()
        }

        fn ping(&self) -> BoxFuture<'_, Result<(), RepositoryError>> {
            async move {
                sqlx::query(include_str!("queries/ping.sql"))
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(())
            }
            .boxed()
        }
    }

    /// Binds every column after the ID, in table order.
    fn bind_columns<'q>(
        query: Query<'q, Postgres, PgArguments>,
        details: &BhajanDetails,
        assets: &AssetReferences,
    ) -> Result<Query<'q, Postgres, PgArguments>, RepositoryError> {
        let duration = i32::try_from(details.duration).map_err(|_| {
            RepositoryError::Validation(format!("duration {} is too long", details.duration))
        })?;
        let url = |url: Option<&Url>| url.map(Url::to_string);

        Ok(query
            .bind(details.title.clone())
            .bind(details.artist.clone())
            .bind(details.language.clone())
            .bind(duration)
            .bind(details.lyrics.clone())
            .bind(details.genre.clone())
            .bind(details.album.clone())
            .bind(details.release_year)
            .bind(details.tags.clone())
            .bind(details.is_featured)
            .bind(details.uploaded_by.to_string())
            .bind(url(assets.audio.as_ref()))
            .bind(url(assets.video.as_ref()))
            .bind(url(assets.thumbnail.as_ref())))
    }

    fn bhajan_from_row(row: &PgRow) -> Result<Bhajan, sqlx::Error> {
        let duration: i32 = try_get(row, "duration")?;
        let duration = u32::try_from(duration)
            .map_err(|_| corrupt("duration", format!("negative duration {}", duration)))?;

        let uploaded_by: String = try_get(row, "uploaded_by")?;
        let uploaded_by = uploaded_by
            .parse()
            .map_err(|message| corrupt("uploaded_by", message))?;

        let details = BhajanDetails {
            title: try_get(row, "title")?,
            artist: try_get(row, "artist")?,
            language: try_get(row, "language")?,
            duration,
            lyrics: try_get(row, "lyrics")?,
            genre: try_get(row, "genre")?,
            album: try_get(row, "album")?,
            release_year: try_get(row, "release_year")?,
            tags: try_get(row, "tags")?,
            is_featured: try_get(row, "is_featured")?,
            uploaded_by,
        };

        let assets = AssetReferences {
            audio: try_get_url(row, "audio")?,
            video: try_get_url(row, "video")?,
            thumbnail: try_get_url(row, "thumbnail")?,
        };

        Ok(Bhajan::new(
            try_get(row, "id")?,
            details,
            assets,
            try_get(row, "views")?,
            try_get(row, "likes")?,
            try_get(row, "created_at")?,
        ))
    }

    fn try_get<'a, T: sqlx::Type<Postgres> + sqlx::decode::Decode<'a, Postgres>>(
        row: &'a PgRow,
        column: &str,
    ) -> Result<T, sqlx::Error> {
        use sqlx::prelude::*;

        row.try_get(column)
    }

    fn try_get_url(row: &PgRow, column: &'static str) -> Result<Option<Url>, sqlx::Error> {
        let value: Option<String> = try_get(row, column)?;

        // we only ever store URLs we generated, but the column is plain text
        value
            .map(|url| Url::parse(&url).map_err(|e| corrupt(column, format!("{}: {}", url, e))))
            .transpose()
    }

    fn corrupt(column: &'static str, message: impl Into<String>) -> sqlx::Error {
        sqlx::Error::Decode(Box::new(RepositoryError::Corrupt {
            column,
            message: message.into(),
        }))
    }

    fn map_sqlx_error(error: sqlx::Error) -> RepositoryError {
        use sqlx::Error;

        match error {
            Error::Database(e) => {
                let message = e.constraint().and_then(|constraint| {
                    CONSTRAINT_MESSAGES
                        .iter()
                        .find(|(name, _)| *name == constraint)
                        .map(|(_, message)| *message)
                });

                match message {
                    Some(message) => RepositoryError::Validation(message.to_owned()),
                    None => RepositoryError::Sqlx {
                        source: Error::Database(e),
                    },
                }
            }
            Error::Decode(e) => match e.downcast::<RepositoryError>() {
                Ok(e) => *e,
                Err(e) => RepositoryError::Sqlx {
                    source: Error::Decode(e),
                },
            },
            source => RepositoryError::Sqlx { source },
        }
    }
}
