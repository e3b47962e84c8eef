//! Diesel schema for preview persistence.

diesel::table! {
    /// Tracked pull requests.
    pull_requests (id) {
        /// Internal pull request identifier.
        id -> Uuid,
        /// Repository in `owner/repo` form.
        #[max_length = 255]
        repository -> Varchar,
        /// Pull request number, unique per repository.
        number -> Int8,
        /// Pull request title.
        title -> Text,
        /// Author login.
        #[max_length = 255]
        author -> Varchar,
        /// Head branch.
        #[max_length = 255]
        head_branch -> Varchar,
        /// Base branch.
        #[max_length = 255]
        base_branch -> Varchar,
        /// Lifecycle status (`open`, `merged`, `closed`).
        #[max_length = 50]
        status -> Varchar,
        /// Latest head commit.
        #[max_length = 40]
        commit_sha -> Nullable<Varchar>,
        /// Preview URL while an environment is live.
        preview_url -> Nullable<Text>,
        /// Browser URL of the pull request.
        github_url -> Text,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Pipeline runs.
    pipelines (id) {
        /// Internal pipeline identifier.
        id -> Uuid,
        /// Owning pull request.
        pull_request_id -> Uuid,
        /// Commit under test.
        #[max_length = 40]
        commit_sha -> Nullable<Varchar>,
        /// Run status.
        #[max_length = 50]
        status -> Varchar,
        /// Creation timestamp.
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Preview environments, live and destroyed.
    environments (id) {
        /// Internal environment identifier.
        id -> Uuid,
        /// Owning pull request.
        pull_request_id -> Uuid,
        /// Kubernetes namespace.
        #[max_length = 63]
        namespace -> Varchar,
        /// Public preview URL.
        url -> Text,
        /// Controller application name.
        #[max_length = 253]
        app_name -> Varchar,
        /// Status (`provisioning` through `destroyed`).
        #[max_length = 50]
        status -> Varchar,
        /// CPU request hint.
        cpu_request -> Nullable<Varchar>,
        /// CPU limit hint.
        cpu_limit -> Nullable<Varchar>,
        /// Memory request hint.
        memory_request -> Nullable<Varchar>,
        /// Memory limit hint.
        memory_limit -> Nullable<Varchar>,
        /// Deploy generation.
        generation -> Int8,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Teardown timestamp.
        destroyed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Append-only event log.
    events (id) {
        /// Internal event identifier.
        id -> Uuid,
        /// Commit order.
        seq -> Int8,
        /// Event type.
        #[max_length = 50]
        event_type -> Varchar,
        /// Human-readable message.
        message -> Text,
        /// Structured metadata.
        metadata -> Nullable<Jsonb>,
        /// Linked pull request.
        pull_request_id -> Nullable<Uuid>,
        /// Linked pipeline.
        pipeline_id -> Nullable<Uuid>,
        /// Creation timestamp.
        created_at -> Timestamptz,
    }
}

diesel::joinable!(pipelines -> pull_requests (pull_request_id));
diesel::joinable!(environments -> pull_requests (pull_request_id));

diesel::allow_tables_to_appear_in_same_query!(pull_requests, pipelines, environments, events);
