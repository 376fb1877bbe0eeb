//! Task composition.
//!
//! A [`Task`] takes the shared release record and hands it back once its work
//! is done. A [`TaskFactory`] builds a task from the run configuration; the
//! composers below call every factory up front, so a factory that fails
//! surfaces its error while the pipeline is being assembled, before any task
//! runs.

use std::future::Future;

use async_trait::async_trait;
use futures_util::future::join_all;

use crate::error::Result;
use crate::release::SharedRelease;

/// An asynchronous unit of work over the release record.
#[async_trait]
pub trait Task: Send + Sync {
    /// Runs the task, returning the record for the next task.
    async fn run(&self, release: SharedRelease) -> Result<SharedRelease>;
}

/// Boxed task, the currency of the composers.
pub type BoxTask = Box<dyn Task>;

/// Builds a task from the run configuration.
pub trait TaskFactory<C: ?Sized>: Send + Sync {
    /// Creates the task. Errors abort pipeline construction.
    fn create(&self, config: &C) -> Result<BoxTask>;
}

impl<C: ?Sized, F> TaskFactory<C> for F
where
    F: Fn(&C) -> Result<BoxTask> + Send + Sync,
{
    fn create(&self, config: &C) -> Result<BoxTask> {
        self(config)
    }
}

struct FnTask<F>(F);

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(SharedRelease) -> Fut + Send + Sync,
    Fut: Future<Output = Result<SharedRelease>> + Send,
{
    async fn run(&self, release: SharedRelease) -> Result<SharedRelease> {
        (self.0)(release).await
    }
}

/// Wraps an async closure as a task.
pub fn task_fn<F, Fut>(f: F) -> BoxTask
where
    F: Fn(SharedRelease) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<SharedRelease>> + Send + 'static,
{
    Box::new(FnTask(f))
}

/// Wraps an async closure that only observes or mutates the record in place.
///
/// The task resolves with the record it received.
pub fn tap<F, Fut>(f: F) -> BoxTask
where
    F: Fn(SharedRelease) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    task_fn(move |release: SharedRelease| {
        let work = f(release.clone());
        async move {
            work.await?;
            Ok(release)
        }
    })
}

struct Identity;

#[async_trait]
impl Task for Identity {
    async fn run(&self, release: SharedRelease) -> Result<SharedRelease> {
        Ok(release)
    }
}

struct Serial(Vec<BoxTask>);

#[async_trait]
impl Task for Serial {
    async fn run(&self, release: SharedRelease) -> Result<SharedRelease> {
        let mut current = release;
        for task in &self.0 {
            current = task.run(current).await?;
        }
        Ok(current)
    }
}

struct Parallel(Vec<BoxTask>);

#[async_trait]
impl Task for Parallel {
    async fn run(&self, release: SharedRelease) -> Result<SharedRelease> {
        // Sibling tasks share the record and must write disjoint fields.
        let outcomes = join_all(self.0.iter().map(|task| task.run(release.clone()))).await;
        for outcome in outcomes {
            outcome?;
        }
        Ok(release)
    }
}

fn instantiate<C: ?Sized>(config: &C, factories: &[&dyn TaskFactory<C>]) -> Result<Vec<BoxTask>> {
    factories.iter().map(|factory| factory.create(config)).collect()
}

/// Builds a task running the factories' tasks one after the other.
///
/// Each task receives the record returned by the previous one. The first
/// failure stops the chain and is returned as is. With no factories the
/// task returns its input unchanged.
pub fn serial<C: ?Sized>(config: &C, factories: &[&dyn TaskFactory<C>]) -> Result<BoxTask> {
    if factories.is_empty() {
        return Ok(Box::new(Identity));
    }
    Ok(Box::new(Serial(instantiate(config, factories)?)))
}

/// Builds a task running the factories' tasks concurrently on the same record.
///
/// Every task is awaited to completion, even after a sibling failed. Resolves
/// with the record it received, or with the first failure in factory order.
pub fn parallel<C: ?Sized>(config: &C, factories: &[&dyn TaskFactory<C>]) -> Result<BoxTask> {
    Ok(Box::new(Parallel(instantiate(config, factories)?)))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::error::Error;
    use crate::release::Release;

    #[derive(Default)]
    struct Counters {
        created: AtomicUsize,
        ran: AtomicUsize,
    }

    fn write_body(config: &Arc<Counters>) -> Result<BoxTask> {
        config.created.fetch_add(1, Ordering::SeqCst);
        let counters = Arc::clone(config);
        Ok(tap(move |release: SharedRelease| {
            let counters = Arc::clone(&counters);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                release.write(|r| r.body = Some("1".to_string()));
                counters.ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
    }

    fn read_body_then_overwrite(config: &Arc<Counters>) -> Result<BoxTask> {
        config.created.fetch_add(1, Ordering::SeqCst);
        Ok(tap(|release: SharedRelease| async move {
            let seen = release.read(|r| r.body.clone());
            if seen.as_deref() != Some("1") {
                return Err(Error::State(format!("unexpected body {:?}", seen)));
            }
            release.write(|r| r.body = Some("2".to_string()));
            Ok(())
        }))
    }

    fn add_credit(_: &Arc<Counters>) -> Result<BoxTask> {
        Ok(tap(|release: SharedRelease| async move {
            release.write(|r| r.add_credit("alice"));
            Ok(())
        }))
    }

    fn failing(_: &Arc<Counters>) -> Result<BoxTask> {
        Ok(tap(|_release: SharedRelease| async move {
            Err(Error::Precondition("boom".to_string()))
        }))
    }

    fn counted(config: &Arc<Counters>) -> Result<BoxTask> {
        let counters = Arc::clone(config);
        Ok(tap(move |_release: SharedRelease| {
            let counters = Arc::clone(&counters);
            async move {
                counters.ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
    }

    fn broken_factory(_: &Arc<Counters>) -> Result<BoxTask> {
        Err(Error::Config("cannot build".to_string()))
    }

    #[tokio::test]
    async fn serial_feeds_each_task_the_previous_output() {
        let config = Arc::new(Counters::default());
        let task = serial(&config, &[&write_body, &read_body_then_overwrite]).unwrap();

        let release = task.run(SharedRelease::new(Release::new())).await.unwrap();

        assert_eq!(release.read(|r| r.body.clone()).as_deref(), Some("2"));
        assert_eq!(config.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn parallel_tasks_mutate_the_same_record() {
        let config = Arc::new(Counters::default());
        let task = parallel(&config, &[&write_body, &add_credit]).unwrap();
        let input = SharedRelease::new(Release::new());

        let output = task.run(input.clone()).await.unwrap();

        assert!(output.ptr_eq(&input));
        output.read(|r| {
            assert_eq!(r.body.as_deref(), Some("1"));
            assert_eq!(r.credits(), ["alice"]);
        });
    }

    #[tokio::test]
    async fn empty_composition_is_identity() {
        let config = Arc::new(Counters::default());
        let input = SharedRelease::new(Release::new());

        let output = serial(&config, &[]).unwrap().run(input.clone()).await.unwrap();
        assert!(output.ptr_eq(&input));

        let output = parallel(&config, &[]).unwrap().run(input.clone()).await.unwrap();
        assert!(output.ptr_eq(&input));
    }

    #[tokio::test]
    async fn serial_stops_at_first_failure() {
        let config = Arc::new(Counters::default());
        let task = serial(&config, &[&counted, &failing, &counted]).unwrap();

        let err = task.run(SharedRelease::default()).await.unwrap_err();

        assert!(matches!(err, Error::Precondition(ref msg) if msg == "boom"));
        assert_eq!(config.ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn parallel_rejects_when_a_branch_fails() {
        let config = Arc::new(Counters::default());
        let task = parallel(&config, &[&counted, &failing]).unwrap();

        let err = task.run(SharedRelease::default()).await.unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    fn slow_writer(_: &Arc<Counters>) -> Result<BoxTask> {
        Ok(tap(|release: SharedRelease| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            release.write(|r| r.body = Some("settled".to_string()));
            Ok(())
        }))
    }

    #[tokio::test]
    async fn parallel_waits_for_siblings_of_a_failed_task() {
        let config = Arc::new(Counters::default());
        let task = parallel(&config, &[&failing, &slow_writer]).unwrap();
        let input = SharedRelease::default();

        let err = task.run(input.clone()).await.unwrap_err();

        assert!(matches!(err, Error::Precondition(ref msg) if msg == "boom"));
        assert_eq!(input.read(|r| r.body.clone()).as_deref(), Some("settled"));
    }

    #[test]
    fn factory_errors_surface_at_composition() {
        let config = Arc::new(Counters::default());

        assert!(matches!(
            serial(&config, &[&counted, &broken_factory]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            parallel(&config, &[&broken_factory]),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn compositions_nest() {
        let config = Arc::new(Counters::default());
        let fan_out = |c: &Arc<Counters>| parallel(c, &[&add_credit, &counted]);
        let task = serial(&config, &[&write_body, &fan_out, &read_body_then_overwrite]).unwrap();

        let release = task.run(SharedRelease::default()).await.unwrap();

        release.read(|r| {
            assert_eq!(r.body.as_deref(), Some("2"));
            assert_eq!(r.credits(), ["alice"]);
        });
        assert_eq!(config.ran.load(Ordering::SeqCst), 2);
    }
}
