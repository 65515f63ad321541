use crate::broker::Broker;
use crate::models::{Order, Side};
use crate::series::Dataframe;

pub type Predicate = Box<dyn Fn(&Dataframe) -> bool + Send>;

/// Standing rule: place a market order once `predicate` holds
pub struct OrderCondition {
    side: Side,
    size: f64,
    predicate: Predicate,
}

impl OrderCondition {
    pub fn side(&self) -> Side {
        self.side
    }

    pub fn size(&self) -> f64 {
        self.size
    }
}

/// Result of one scheduler pass
#[derive(Debug, Default)]
pub struct Evaluation {
    /// Orders placed by conditions that fired (and were removed)
    pub executed: Vec<Order>,
    /// Conditions that fired but whose order failed (kept for the next pass)
    pub failed: usize,
}

/// Conditional market orders for one pair
///
/// Every pending condition is checked on each [`Scheduler::evaluate`] call in
/// registration order. A condition is dropped only after the broker accepted
/// its order; a failed placement keeps it for the next pass.
pub struct Scheduler {
    pair: String,
    conditions: Vec<OrderCondition>,
}

impl Scheduler {
    pub fn new(pair: &str) -> Self {
        Self {
            pair: pair.to_string(),
            conditions: Vec::new(),
        }
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    /// Buy `size` at market once `predicate` returns true
    pub fn buy_when<F>(&mut self, size: f64, predicate: F)
    where
        F: Fn(&Dataframe) -> bool + Send + 'static,
    {
        self.register(Side::Buy, size, Box::new(predicate));
    }

    /// Sell `size` at market once `predicate` returns true
    pub fn sell_when<F>(&mut self, size: f64, predicate: F)
    where
        F: Fn(&Dataframe) -> bool + Send + 'static,
    {
        self.register(Side::Sell, size, Box::new(predicate));
    }

    fn register(&mut self, side: Side, size: f64, predicate: Predicate) {
        self.conditions.push(OrderCondition {
            side,
            size,
            predicate,
        });
    }

    /// Number of conditions still waiting to fire
    pub fn pending(&self) -> usize {
        self.conditions.len()
    }

    pub fn conditions(&self) -> &[OrderCondition] {
        &self.conditions
    }

    /// Check every pending condition against `df`, placing orders for those
    /// that hold
    pub fn evaluate(&mut self, df: &Dataframe, broker: &dyn Broker) -> Evaluation {
        let pair = &self.pair;
        let mut evaluation = Evaluation::default();

        self.conditions.retain(|condition| {
            if !(condition.predicate)(df) {
                return true;
            }

            match broker.create_order_market(condition.side, pair, condition.size) {
                Ok(order) => {
                    tracing::info!(
                        pair = %pair,
                        side = %condition.side,
                        size = condition.size,
                        price = order.price,
                        "scheduled order executed"
                    );
                    evaluation.executed.push(order);
                    false
                }
                Err(err) => {
                    tracing::warn!(
                        pair = %pair,
                        side = %condition.side,
                        size = condition.size,
                        error = %err,
                        "scheduled order failed, will retry"
                    );
                    evaluation.failed += 1;
                    true
                }
            }
        });

        evaluation
    }
}
