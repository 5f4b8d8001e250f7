//! Grouped Top-N operator
//!
//! Ranks every batch it receives independently: records are partitioned by
//! group key, each group keeps a [`RankedList`] of at most `n` entries, and
//! the whole mapping is emitted as a single record once the batch has been
//! consumed. Nothing is carried over from one batch to the next.

use super::ranking::{hash_key, Order, RankedList, Tuple};
use crate::error::{FlowError, Result};
use crate::lifecycle::ComponentState;
use crate::operator::{panic_message, recv_upstream, send_downstream, Operator, OperatorContext};
use crate::record::{Record, RecordBatch};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Ranked entries per group key
pub type TopNResult<T> = HashMap<String, Vec<Tuple<T>>>;

type StringExtractor<T> = Arc<dyn Fn(&Record<T>) -> String + Send + Sync>;
type SortKeyExtractor<T> = Arc<dyn Fn(&Record<T>) -> i64 + Send + Sync>;

/// Options recognized by the Top-N operator
///
/// ```rust
/// use flow::topn::{Order, TopNOptions};
///
/// let options = TopNOptions::<(String, i64)>::new()
///     .with_sort_key_extractor(|r| r.data().1)
///     .with_group_key_extractor(|r| r.data().0.clone())
///     .order_by(Order::Desc);
/// ```
pub struct TopNOptions<T> {
    key: Option<StringExtractor<T>>,
    sort_key: Option<SortKeyExtractor<T>>,
    group_key: Option<StringExtractor<T>>,
    order: Order,
}

impl<T> TopNOptions<T> {
    pub fn new() -> Self {
        Self {
            key: None,
            sort_key: None,
            group_key: None,
            order: Order::default(),
        }
    }

    /// Identity of a record, hashed into the tie-break value
    ///
    /// Within one batch a record replaces the entry of its group that has
    /// the same identity.
    pub fn with_key_extractor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record<T>) -> String + Send + Sync + 'static,
    {
        self.key = Some(Arc::new(f));
        self
    }

    /// Value records are ranked by (required)
    pub fn with_sort_key_extractor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record<T>) -> i64 + Send + Sync + 'static,
    {
        self.sort_key = Some(Arc::new(f));
        self
    }

    /// Group a record is ranked in; all records share one group otherwise
    pub fn with_group_key_extractor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record<T>) -> String + Send + Sync + 'static,
    {
        self.group_key = Some(Arc::new(f));
        self
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn order(&self) -> Order {
        self.order
    }

    /// Check the options and bind them to a list size
    pub fn ranker(&self, n: usize) -> Result<Ranker<T>> {
        if n == 0 {
            return Err(FlowError::config("top-n size must be greater than 0"));
        }
        let sort_key = self
            .sort_key
            .clone()
            .ok_or_else(|| FlowError::config("top-n requires a sort key extractor"))?;

        Ok(Ranker {
            n,
            order: self.order,
            key: self.key.clone(),
            sort_key,
            group_key: self.group_key.clone(),
        })
    }
}

impl<T> Default for TopNOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TopNOptions<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            sort_key: self.sort_key.clone(),
            group_key: self.group_key.clone(),
            order: self.order,
        }
    }
}

impl<T> fmt::Debug for TopNOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopNOptions")
            .field("key_extractor", &self.key.is_some())
            .field("sort_key_extractor", &self.sort_key.is_some())
            .field("group_key_extractor", &self.group_key.is_some())
            .field("order", &self.order)
            .finish()
    }
}

/// Validated Top-N configuration
pub struct Ranker<T> {
    n: usize,
    order: Order,
    key: Option<StringExtractor<T>>,
    sort_key: SortKeyExtractor<T>,
    group_key: Option<StringExtractor<T>>,
}

impl<T> Ranker<T> {
    /// Rank one batch of records
    pub fn rank(&self, records: impl IntoIterator<Item = Record<T>>) -> TopNResult<T> {
        let mut groups: HashMap<String, RankedList<T>> = HashMap::new();

        for record in records {
            let group = self
                .group_key
                .as_ref()
                .map(|f| f(&record))
                .unwrap_or_default();
            let sort_key = (self.sort_key)(&record);
            let tuple = match &self.key {
                Some(f) => {
                    let hash = hash_key(&f(&record));
                    Tuple::with_key_hash(sort_key, record, hash)
                }
                None => Tuple::new(sort_key, record),
            };

            groups
                .entry(group)
                .or_insert_with(|| RankedList::new(self.n, self.order))
                .offer(tuple);
        }

        groups
            .into_iter()
            .map(|(group, list)| (group, list.into_entries()))
            .collect()
    }
}

/// Operator ranking each incoming batch into a [`TopNResult`]
pub struct TopNOperator<B, T> {
    name: String,
    n: usize,
    options: TopNOptions<T>,
    input: Option<mpsc::Receiver<Record<B>>>,
    output: Option<mpsc::Sender<Record<TopNResult<T>>>>,
    state: ComponentState,
    _batch: PhantomData<fn() -> B>,
}

impl<B, T> TopNOperator<B, T>
where
    B: RecordBatch<T>,
{
    pub fn new(
        name: impl Into<String>,
        n: usize,
        options: TopNOptions<T>,
        input: mpsc::Receiver<Record<B>>,
        output: mpsc::Sender<Record<TopNResult<T>>>,
    ) -> Self {
        Self {
            name: name.into(),
            n,
            options,
            input: Some(input),
            output: Some(output),
            state: ComponentState::new(),
            _batch: PhantomData,
        }
    }
}

impl<B, T> Operator for TopNOperator<B, T>
where
    B: RecordBatch<T>,
    T: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> &ComponentState {
        &self.state
    }

    fn setup(&mut self, ctx: &OperatorContext) -> Result<()> {
        let ranker = self.options.ranker(self.n)?;
        let (Some(input), Some(output)) = (self.input.take(), self.output.take()) else {
            return Err(FlowError::Lifecycle(format!(
                "operator '{}' already started",
                self.name
            )));
        };
        let guard = self.state.enter();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let _guard = guard;
            run_top_n(ctx, ranker, input, output).await;
        });
        Ok(())
    }
}

async fn run_top_n<B, T>(
    ctx: OperatorContext,
    ranker: Ranker<T>,
    mut input: mpsc::Receiver<Record<B>>,
    output: mpsc::Sender<Record<TopNResult<T>>>,
) where
    B: RecordBatch<T>,
{
    while let Some(batch) = recv_upstream(&ctx, &mut input).await {
        let timestamp = batch.timestamp();
        let records = batch.into_data().into_records();
        let size = records.len();

        let ranked = match catch_unwind(AssertUnwindSafe(|| ranker.rank(records))) {
            Ok(ranked) => ranked,
            Err(panic) => {
                ctx.report(FlowError::UserFunction {
                    operator: ctx.operator().to_string(),
                    reason: panic_message(panic),
                });
                break;
            }
        };
        debug!(
            operator = %ctx.operator(),
            records = size,
            groups = ranked.len(),
            "Batch ranked"
        );

        let result = match timestamp {
            Some(ts) => Record::new(ranked, ts),
            None => Record::without_ts(ranked),
        };
        if !send_downstream(&ctx, &output, result).await {
            break;
        }
    }
    debug!(operator = %ctx.operator(), "top-n stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowConfig;
    use crate::operator::test_support::context;

    #[derive(Debug, Clone, PartialEq)]
    struct Sample {
        service: &'static str,
        instance: &'static str,
        value: i64,
    }

    fn sample(service: &'static str, instance: &'static str, value: i64, ts: i64) -> Record<Sample> {
        Record::new(
            Sample {
                service,
                instance,
                value,
            },
            ts,
        )
    }

    fn batch() -> Vec<Record<Sample>> {
        vec![
            sample("provider", "instance-001", 10000, 1000),
            sample("consumer", "instance-001", 9900, 2000),
            sample("provider", "instance-002", 9800, 3000),
            sample("consumer", "instance-002", 9700, 4000),
            sample("provider", "instance-003", 9700, 5000),
            sample("consumer", "instance-004", 9600, 6000),
            sample("consumer", "instance-001", 9500, 7000),
        ]
    }

    fn options() -> TopNOptions<Sample> {
        TopNOptions::new()
            .with_key_extractor(|r: &Record<Sample>| format!("{}{}", r.data().service, r.data().instance))
            .with_sort_key_extractor(|r: &Record<Sample>| r.data().value)
            .with_group_key_extractor(|r: &Record<Sample>| r.data().service.to_string())
    }

    fn values(result: &TopNResult<Sample>, group: &str) -> Vec<i64> {
        result[group].iter().map(|t| t.sort_key).collect()
    }

    #[test]
    fn test_rank_ascending() {
        let ranked = options().ranker(3).unwrap().rank(batch());
        assert_eq!(values(&ranked, "consumer"), vec![9500, 9600, 9700]);
        assert_eq!(values(&ranked, "provider"), vec![9700, 9800, 10000]);
        assert_eq!(ranked["consumer"][0].record.timestamp(), Some(7000));
    }

    #[test]
    fn test_rank_descending() {
        let ranked = options().order_by(Order::Desc).ranker(3).unwrap().rank(batch());
        assert_eq!(values(&ranked, "consumer"), vec![9700, 9600, 9500]);
        assert_eq!(values(&ranked, "provider"), vec![10000, 9800, 9700]);
    }

    #[test]
    fn test_rank_single_group_without_extractors() {
        let ranker = TopNOptions::new()
            .with_sort_key_extractor(|r: &Record<i64>| *r.data())
            .ranker(2)
            .unwrap();
        let ranked = ranker.rank((0..10).map(Record::without_ts));

        assert_eq!(ranked.len(), 1);
        let keys: Vec<i64> = ranked[""].iter().map(|t| t.sort_key).collect();
        assert_eq!(keys, vec![0, 1]);
    }

    #[test]
    fn test_invalid_options_rejected() {
        assert!(matches!(
            options().ranker(0),
            Err(FlowError::Configuration { .. })
        ));
        assert!(matches!(
            TopNOptions::<i64>::new().ranker(3),
            Err(FlowError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_operator_emits_one_result_per_batch() {
        let (ctx, _errors, _cancel) = context(FlowConfig::default());
        let (in_tx, in_rx) = mpsc::channel(1);
        let (out_tx, mut out_rx) = mpsc::channel(1);

        let mut op = TopNOperator::new("top-n", 3, options(), in_rx, out_tx);
        op.setup(&ctx).unwrap();

        in_tx.send(Record::new(batch(), 14_999)).await.unwrap();
        in_tx
            .send(Record::new(vec![sample("provider", "instance-002", 9800, 61_000)], 74_999))
            .await
            .unwrap();
        drop(in_tx);

        let first = out_rx.recv().await.expect("first result");
        assert_eq!(first.timestamp(), Some(14_999));
        assert_eq!(first.data().len(), 2);

        let second = out_rx.recv().await.expect("second result");
        assert_eq!(values(second.data(), "provider"), vec![9800]);
        assert!(!second.data().contains_key("consumer"));

        assert!(out_rx.recv().await.is_none());
        op.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_setup_fails_without_sort_key() {
        let (ctx, _errors, _cancel) = context(FlowConfig::default());
        let (_in_tx, in_rx) = mpsc::channel::<Record<Vec<Record<i64>>>>(1);
        let (out_tx, _out_rx) = mpsc::channel(1);

        let mut op = TopNOperator::new("top-n", 3, TopNOptions::<i64>::new(), in_rx, out_tx);
        assert!(matches!(op.setup(&ctx), Err(FlowError::Configuration { .. })));
        assert_eq!(op.state().active(), 0);
    }

    #[tokio::test]
    async fn test_extractor_panic_is_reported() {
        let (ctx, mut errors, _cancel) = context(FlowConfig::default());
        let (in_tx, in_rx) = mpsc::channel(1);
        let (out_tx, mut out_rx) = mpsc::channel(1);

        let options = TopNOptions::new().with_sort_key_extractor(|r: &Record<i64>| {
            if *r.data() < 0 {
                panic!("negative value");
            }
            *r.data()
        });
        let mut op = TopNOperator::new("top-n", 3, options, in_rx, out_tx);
        op.setup(&ctx).unwrap();
        in_tx.send(Record::without_ts(vec![Record::without_ts(-1)])).await.unwrap();

        assert!(out_rx.recv().await.is_none());
        op.teardown().await.unwrap();
        assert!(matches!(
            errors.recv().await,
            Some(FlowError::UserFunction { ref reason, .. }) if reason == "negative value"
        ));
    }
}
