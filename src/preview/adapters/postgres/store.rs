//! `PostgreSQL` implementation of the preview store.

use super::{
    models::{
        EnvironmentChangeset, EnvironmentRow, EventRow, NewEventRow, PipelineRow,
        PullRequestChangeset, PullRequestRow,
    },
    schema::{environments, events, pipelines, pull_requests},
};
use crate::preview::{
    domain::{
        ApplicationName, CommitSha, Environment, EnvironmentId, EnvironmentStatus, Event, EventId,
        EventType, Namespace, PersistedEnvironmentData, PersistedEventData,
        PersistedPullRequestData, Pipeline, PipelineId, PullRequest, PullRequestDetails,
        PullRequestId, PullRequestNumber, PullRequestStatus, RepositoryFullName, ResourceHints,
    },
    ports::{
        ChangeSet, EnvironmentStatusWrite, PreviewStore, RecordWrite, StoreError, StoreResult,
    },
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type for preview adapters.
pub type PreviewPgPool = Pool<ConnectionManager<PgConnection>>;

const LIVE_ENVIRONMENT_PER_PR_INDEX: &str = "idx_environments_live_pull_request";
const LIVE_NAMESPACE_INDEX: &str = "idx_environments_live_namespace";
const DESTROYED: &str = "destroyed";

/// `PostgreSQL`-backed preview store.
#[derive(Debug, Clone)]
pub struct PostgresPreviewStore {
    pool: PreviewPgPool,
}

impl PostgresPreviewStore {
    /// Creates a new store from a `PostgreSQL` pool.
    #[must_use]
    pub const fn new(pool: PreviewPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, operation: F) -> StoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(StoreError::persistence)?;
            operation(&mut connection)
        })
        .await
        .map_err(StoreError::persistence)?
    }
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

enum StagedPullRequest {
    Insert {
        row: PullRequestRow,
        repository: RepositoryFullName,
        number: PullRequestNumber,
    },
    Update {
        id: PullRequestId,
        changes: PullRequestChangeset,
    },
}

enum StagedEnvironment {
    Insert(EnvironmentRow),
    Update {
        id: EnvironmentId,
        changes: EnvironmentChangeset,
    },
}

struct StagedEnvironmentWrite {
    write: StagedEnvironment,
    pull_request_id: PullRequestId,
    namespace: Namespace,
}

struct StagedChanges {
    pull_requests: Vec<StagedPullRequest>,
    pipelines: Vec<PipelineRow>,
    environments: Vec<StagedEnvironmentWrite>,
    environment_statuses: Vec<EnvironmentStatusWrite>,
    events: Vec<NewEventRow>,
}

impl StagedChanges {
    fn from_changes(changes: &ChangeSet) -> StoreResult<Self> {
        let pull_requests = changes
            .pull_requests()
            .iter()
            .map(|write| match write {
                RecordWrite::Insert(pr) => Ok(StagedPullRequest::Insert {
                    row: pull_request_row(pr)?,
                    repository: pr.repository().clone(),
                    number: pr.number(),
                }),
                RecordWrite::Update(pr) => Ok(StagedPullRequest::Update {
                    id: pr.id(),
                    changes: pull_request_changeset(pr),
                }),
            })
            .collect::<StoreResult<Vec<_>>>()?;
        let environments = changes
            .environments()
            .iter()
            .map(|write| {
                let env = write.record();
                let staged = match write {
                    RecordWrite::Insert(_) => StagedEnvironment::Insert(environment_row(env)?),
                    RecordWrite::Update(_) => StagedEnvironment::Update {
                        id: env.id(),
                        changes: environment_changeset(env)?,
                    },
                };
                Ok(StagedEnvironmentWrite {
                    write: staged,
                    pull_request_id: env.pull_request_id(),
                    namespace: env.namespace().clone(),
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Self {
            pull_requests,
            pipelines: changes.pipelines().iter().map(pipeline_row).collect(),
            environments,
            environment_statuses: changes.environment_statuses().to_vec(),
            events: changes.events().iter().map(new_event_row).collect(),
        })
    }

    fn write(self, connection: &mut PgConnection) -> StoreResult<()> {
        for staged in self.pull_requests {
            write_pull_request(connection, staged)?;
        }
        for row in self.pipelines {
            let pull_request_id = PullRequestId::from_uuid(row.pull_request_id);
            diesel::insert_into(pipelines::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| map_missing_pull_request(err, pull_request_id))?;
        }
        for staged in self.environments {
            write_environment(connection, staged)?;
        }
        for write in &self.environment_statuses {
            write_environment_status(connection, write)?;
        }
        if !self.events.is_empty() {
            diesel::insert_into(events::table)
                .values(&self.events)
                .execute(connection)?;
        }
        Ok(())
    }
}

fn write_pull_request(connection: &mut PgConnection, staged: StagedPullRequest) -> StoreResult<()> {
    match staged {
        StagedPullRequest::Insert {
            row,
            repository,
            number,
        } => {
            diesel::insert_into(pull_requests::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        StoreError::DuplicatePullRequest { repository, number }
                    }
                    other => StoreError::persistence(other),
                })?;
        }
        StagedPullRequest::Update { id, changes } => {
            let updated = diesel::update(pull_requests::table.find(id.into_inner()))
                .set(&changes)
                .execute(connection)?;
            if updated == 0 {
                return Err(StoreError::NotFound {
                    kind: "pull request",
                    id: id.into_inner(),
                });
            }
        }
    }
    Ok(())
}

fn write_environment(
    connection: &mut PgConnection,
    staged: StagedEnvironmentWrite,
) -> StoreResult<()> {
    let StagedEnvironmentWrite {
        write,
        pull_request_id,
        namespace,
    } = staged;
    let map_err = |err: DieselError| match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
            if violates(info.as_ref(), LIVE_ENVIRONMENT_PER_PR_INDEX) =>
        {
            StoreError::DuplicateEnvironment(pull_request_id)
        }
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
            if violates(info.as_ref(), LIVE_NAMESPACE_INDEX) =>
        {
            StoreError::DuplicateNamespace(namespace.clone())
        }
        other => map_missing_pull_request(other, pull_request_id),
    };

    match write {
        StagedEnvironment::Insert(row) => {
            diesel::insert_into(environments::table)
                .values(&row)
                .execute(connection)
                .map_err(map_err)?;
        }
        StagedEnvironment::Update { id, changes } => {
            let updated = diesel::update(environments::table.find(id.into_inner()))
                .set(&changes)
                .execute(connection)
                .map_err(map_err)?;
            if updated == 0 {
                return Err(StoreError::NotFound {
                    kind: "environment",
                    id: id.into_inner(),
                });
            }
        }
    }
    Ok(())
}

fn write_environment_status(
    connection: &mut PgConnection,
    write: &EnvironmentStatusWrite,
) -> StoreResult<()> {
    let id = write.id.into_inner();
    let updated = diesel::update(
        environments::table
            .filter(environments::id.eq(id))
            .filter(environments::generation.eq(to_i64(write.expected_generation)?))
            .filter(environments::status.eq(write.expected_status.as_str())),
    )
    .set(environments::status.eq(write.status.as_str()))
    .execute(connection)?;
    if updated > 0 {
        return Ok(());
    }

    let current = environments::table
        .find(id)
        .select(environments::generation)
        .first::<i64>(connection)
        .optional()?;
    match current {
        None => Err(StoreError::NotFound {
            kind: "environment",
            id,
        }),
        Some(generation) => Err(StoreError::StaleEnvironment {
            id: write.id,
            expected_generation: write.expected_generation,
            current_generation: u64::try_from(generation).map_err(StoreError::persistence)?,
        }),
    }
}

fn violates(info: &dyn DatabaseErrorInformation, constraint: &str) -> bool {
    info.constraint_name().is_some_and(|name| name == constraint)
}

fn map_missing_pull_request(err: DieselError, pull_request_id: PullRequestId) -> StoreError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
            StoreError::NotFound {
                kind: "pull request",
                id: pull_request_id.into_inner(),
            }
        }
        other => StoreError::persistence(other),
    }
}

#[async_trait]
impl PreviewStore for PostgresPreviewStore {
    async fn find_pull_request(&self, id: PullRequestId) -> StoreResult<Option<PullRequest>> {
        self.run_blocking(move |connection| {
            let row = pull_requests::table
                .find(id.into_inner())
                .select(PullRequestRow::as_select())
                .first::<PullRequestRow>(connection)
                .optional()?;
            row.map(row_to_pull_request).transpose()
        })
        .await
    }

    async fn find_pull_request_by_number(
        &self,
        repository: &RepositoryFullName,
        number: PullRequestNumber,
    ) -> StoreResult<Option<PullRequest>> {
        let repository_name = repository.as_str().to_owned();
        let persisted_number = to_i64(number.value())?;
        self.run_blocking(move |connection| {
            let row = pull_requests::table
                .filter(pull_requests::repository.eq(&repository_name))
                .filter(pull_requests::number.eq(persisted_number))
                .select(PullRequestRow::as_select())
                .first::<PullRequestRow>(connection)
                .optional()?;
            row.map(row_to_pull_request).transpose()
        })
        .await
    }

    async fn find_live_environment(
        &self,
        pull_request_id: PullRequestId,
    ) -> StoreResult<Option<Environment>> {
        self.run_blocking(move |connection| {
            let row = environments::table
                .filter(environments::pull_request_id.eq(pull_request_id.into_inner()))
                .filter(environments::status.ne(DESTROYED))
                .select(EnvironmentRow::as_select())
                .first::<EnvironmentRow>(connection)
                .optional()?;
            row.map(row_to_environment).transpose()
        })
        .await
    }

    async fn find_live_environment_by_app_name(
        &self,
        app_name: &ApplicationName,
    ) -> StoreResult<Option<Environment>> {
        let name = app_name.as_str().to_owned();
        self.run_blocking(move |connection| {
            let row = environments::table
                .filter(environments::app_name.eq(&name))
                .filter(environments::status.ne(DESTROYED))
                .select(EnvironmentRow::as_select())
                .first::<EnvironmentRow>(connection)
                .optional()?;
            row.map(row_to_environment).transpose()
        })
        .await
    }

    async fn list_environments(
        &self,
        pull_request_id: PullRequestId,
    ) -> StoreResult<Vec<Environment>> {
        self.run_blocking(move |connection| {
            let rows = environments::table
                .filter(environments::pull_request_id.eq(pull_request_id.into_inner()))
                .order(environments::created_at.asc())
                .select(EnvironmentRow::as_select())
                .load::<EnvironmentRow>(connection)?;
            rows.into_iter().map(row_to_environment).collect()
        })
        .await
    }

    async fn list_events(&self, pull_request_id: PullRequestId) -> StoreResult<Vec<Event>> {
        self.run_blocking(move |connection| {
            let rows = events::table
                .filter(events::pull_request_id.eq(pull_request_id.into_inner()))
                .order(events::seq.asc())
                .select(EventRow::as_select())
                .load::<EventRow>(connection)?;
            rows.into_iter().map(row_to_event).collect()
        })
        .await
    }

    async fn apply(&self, changes: ChangeSet) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let staged = StagedChanges::from_changes(&changes)?;
        self.run_blocking(move |connection| {
            connection.transaction::<_, StoreError, _>(|tx| staged.write(tx))
        })
        .await
    }
}

fn to_i64(value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(StoreError::persistence)
}

fn pull_request_row(pr: &PullRequest) -> StoreResult<PullRequestRow> {
    let details = pr.details();
    Ok(PullRequestRow {
        id: pr.id().into_inner(),
        repository: details.repository.as_str().to_owned(),
        number: to_i64(details.number.value())?,
        title: details.title.clone(),
        author: details.author.clone(),
        head_branch: details.head_branch.clone(),
        base_branch: details.base_branch.clone(),
        status: pr.status().as_str().to_owned(),
        commit_sha: pr.commit_sha().map(|sha| sha.as_str().to_owned()),
        preview_url: pr.preview_url().map(str::to_owned),
        github_url: details.github_url.clone(),
        created_at: pr.created_at(),
        updated_at: pr.updated_at(),
    })
}

fn pull_request_changeset(pr: &PullRequest) -> PullRequestChangeset {
    PullRequestChangeset {
        title: pr.details().title.clone(),
        status: pr.status().as_str().to_owned(),
        commit_sha: pr.commit_sha().map(|sha| sha.as_str().to_owned()),
        preview_url: pr.preview_url().map(str::to_owned),
        updated_at: pr.updated_at(),
    }
}

fn pipeline_row(pipeline: &Pipeline) -> PipelineRow {
    PipelineRow {
        id: pipeline.id().into_inner(),
        pull_request_id: pipeline.pull_request_id().into_inner(),
        commit_sha: pipeline.commit_sha().map(|sha| sha.as_str().to_owned()),
        status: pipeline.status().as_str().to_owned(),
        created_at: pipeline.created_at(),
    }
}

fn environment_row(env: &Environment) -> StoreResult<EnvironmentRow> {
    let hints = env.resource_hints().clone();
    Ok(EnvironmentRow {
        id: env.id().into_inner(),
        pull_request_id: env.pull_request_id().into_inner(),
        namespace: env.namespace().as_str().to_owned(),
        url: env.url().to_owned(),
        app_name: env.app_name().as_str().to_owned(),
        status: env.status().as_str().to_owned(),
        cpu_request: hints.cpu_request,
        cpu_limit: hints.cpu_limit,
        memory_request: hints.memory_request,
        memory_limit: hints.memory_limit,
        generation: to_i64(env.generation())?,
        created_at: env.created_at(),
        destroyed_at: env.destroyed_at(),
    })
}

fn environment_changeset(env: &Environment) -> StoreResult<EnvironmentChangeset> {
    Ok(EnvironmentChangeset {
        url: env.url().to_owned(),
        status: env.status().as_str().to_owned(),
        generation: to_i64(env.generation())?,
        destroyed_at: env.destroyed_at(),
    })
}

fn new_event_row(event: &Event) -> NewEventRow {
    NewEventRow {
        id: event.id().into_inner(),
        event_type: event.event_type().as_str().to_owned(),
        message: event.message().to_owned(),
        metadata: event.metadata().cloned(),
        pull_request_id: event.pull_request_id().map(PullRequestId::into_inner),
        pipeline_id: event.pipeline_id().map(PipelineId::into_inner),
        created_at: event.created_at(),
    }
}

fn row_to_pull_request(row: PullRequestRow) -> StoreResult<PullRequest> {
    let number = u64::try_from(row.number).map_err(StoreError::persistence)?;
    let details = PullRequestDetails {
        repository: RepositoryFullName::new(row.repository).map_err(StoreError::persistence)?,
        number: PullRequestNumber::new(number).map_err(StoreError::persistence)?,
        title: row.title,
        author: row.author,
        head_branch: row.head_branch,
        base_branch: row.base_branch,
        commit_sha: row
            .commit_sha
            .map(CommitSha::new)
            .transpose()
            .map_err(StoreError::persistence)?,
        github_url: row.github_url,
    };
    Ok(PullRequest::from_persisted(PersistedPullRequestData {
        id: PullRequestId::from_uuid(row.id),
        details,
        status: PullRequestStatus::try_from(row.status.as_str())
            .map_err(StoreError::persistence)?,
        preview_url: row.preview_url,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

fn row_to_environment(row: EnvironmentRow) -> StoreResult<Environment> {
    let data = PersistedEnvironmentData {
        id: EnvironmentId::from_uuid(row.id),
        pull_request_id: PullRequestId::from_uuid(row.pull_request_id),
        namespace: Namespace::new(row.namespace).map_err(StoreError::persistence)?,
        url: row.url,
        app_name: ApplicationName::new(row.app_name).map_err(StoreError::persistence)?,
        status: EnvironmentStatus::try_from(row.status.as_str())
            .map_err(StoreError::persistence)?,
        resource_hints: ResourceHints {
            cpu_request: row.cpu_request,
            cpu_limit: row.cpu_limit,
            memory_request: row.memory_request,
            memory_limit: row.memory_limit,
        },
        generation: u64::try_from(row.generation).map_err(StoreError::persistence)?,
        created_at: row.created_at,
        destroyed_at: row.destroyed_at,
    };
    Ok(Environment::from_persisted(data))
}

fn row_to_event(row: EventRow) -> StoreResult<Event> {
    Ok(Event::from_persisted(PersistedEventData {
        id: EventId::from_uuid(row.id),
        event_type: EventType::try_from(row.event_type.as_str())
            .map_err(StoreError::persistence)?,
        message: row.message,
        metadata: row.metadata,
        pull_request_id: row.pull_request_id.map(PullRequestId::from_uuid),
        pipeline_id: row.pipeline_id.map(PipelineId::from_uuid),
        created_at: row.created_at,
    }))
}
