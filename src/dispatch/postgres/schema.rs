//! Diesel schema for the durable task queue.

diesel::table! {
    /// Reconciliation tasks, pending and settled.
    reconciliation_tasks (id) {
        /// Task identifier.
        id -> Uuid,
        /// Task kind (`handle_pr_event`, `deploy`, `destroy`, `poll`).
        #[max_length = 50]
        kind -> Varchar,
        /// Serialized task.
        payload -> Jsonb,
        /// Queue status (`pending`, `completed`, `failed`).
        #[max_length = 50]
        status -> Varchar,
        /// Execution number, starting at 1.
        attempt -> Int4,
        /// First enqueue time.
        enqueued_at -> Timestamptz,
        /// Earliest reservation time.
        available_at -> Timestamptz,
        /// Current reservation.
        lease_id -> Nullable<Uuid>,
        /// Reservation expiry.
        leased_until -> Nullable<Timestamptz>,
        /// Failure reason of a failed task.
        last_error -> Nullable<Text>,
        /// Last state change.
        updated_at -> Timestamptz,
    }
}
