use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{Broker, BrokerError, CandleSubscriber};
use crate::models::{split_pair, Account, Balance, Candle, Order, OrderStatus, OrderType, Side};

/// Tolerance for balance checks after lock/release round trips
const EPSILON: f64 = 1e-9;

#[derive(Debug, Default, Clone, Copy)]
struct Holding {
    free: f64,
    locked: f64,
}

#[derive(Debug, Default)]
struct Wallet {
    holdings: HashMap<String, Holding>,
    /// Average entry price per asset, for realized P&L
    avg_price: HashMap<String, f64>,
    last_price: HashMap<String, f64>,
    /// Time of the latest candle seen, stamps orders in replays
    clock: Option<DateTime<Utc>>,
    orders: Vec<Order>,
    /// Lock key (order id, or group id for OCO legs) -> (asset, amount)
    locks: HashMap<i64, (String, f64)>,
    next_id: i64,
    realized: Vec<f64>,
}

impl Wallet {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    fn price(&self, pair: &str) -> Result<f64, BrokerError> {
        self.last_price
            .get(pair)
            .copied()
            .ok_or_else(|| BrokerError::NoMarketPrice(pair.to_string()))
    }

    fn holding(&self, asset: &str) -> Holding {
        self.holdings.get(asset).copied().unwrap_or_default()
    }

    fn ensure_free(&self, asset: &str, needed: f64) -> Result<(), BrokerError> {
        let available = self.holding(asset).free;
        if needed - available > EPSILON {
            return Err(BrokerError::InsufficientFunds {
                asset: asset.to_string(),
                needed,
                available,
            });
        }
        Ok(())
    }

    fn lock(&mut self, key: i64, asset: &str, amount: f64) -> Result<(), BrokerError> {
        self.ensure_free(asset, amount)?;
        let holding = self.holdings.entry(asset.to_string()).or_default();
        holding.free -= amount;
        holding.locked += amount;
        self.locks.insert(key, (asset.to_string(), amount));
        Ok(())
    }

    fn release(&mut self, key: i64) {
        if let Some((asset, amount)) = self.locks.remove(&key) {
            let holding = self.holdings.entry(asset).or_default();
            holding.locked -= amount;
            holding.free += amount;
        }
    }

    /// Move funds for a trade of `size` at `price`
    fn settle(
        &mut self,
        side: Side,
        asset: &str,
        quote: &str,
        size: f64,
        price: f64,
    ) -> Result<(), BrokerError> {
        let value = size * price;

        match side {
            Side::Buy => {
                self.ensure_free(quote, value)?;
                let held = self.holding(asset).free + self.holding(asset).locked;
                let avg = self.avg_price.get(asset).copied().unwrap_or(price);
                self.avg_price
                    .insert(asset.to_string(), (held * avg + value) / (held + size));

                self.holdings.entry(quote.to_string()).or_default().free -= value;
                self.holdings.entry(asset.to_string()).or_default().free += size;
            }
            Side::Sell => {
                self.ensure_free(asset, size)?;
                if let Some(avg) = self.avg_price.get(asset) {
                    self.realized.push((price - avg) * size);
                }

                self.holdings.entry(asset.to_string()).or_default().free -= size;
                self.holdings.entry(quote.to_string()).or_default().free += value;
            }
        }

        Ok(())
    }

    fn draft(
        &self,
        id: i64,
        pair: &str,
        side: Side,
        order_type: OrderType,
        price: f64,
        quantity: f64,
    ) -> Order {
        let now = self.now();
        Order {
            id,
            client_order_id: Uuid::new_v4(),
            pair: pair.to_string(),
            side,
            order_type,
            status: OrderStatus::New,
            price,
            quantity,
            stop: None,
            group_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn market(&mut self, side: Side, pair: &str, size: f64) -> Result<Order, BrokerError> {
        validate_quantity(size)?;
        let (asset, quote) = assets(pair)?;
        let price = self.price(pair)?;

        self.settle(side, asset, quote, size, price)?;

        let id = self.next_id();
        let mut order = self.draft(id, pair, side, OrderType::Market, price, size);
        order.status = OrderStatus::Filled;
        self.orders.push(order.clone());

        tracing::debug!(pair, %side, size, price, "paper market order filled");
        Ok(order)
    }

    /// Fill the open order at `index`; OCO siblings are cancelled
    fn fill(&mut self, index: usize) -> Result<(), BrokerError> {
        let order = self.orders[index].clone();
        let (asset, quote) = assets(&order.pair)?;
        let key = order.group_id.unwrap_or(order.id);

        self.release(key);
        self.settle(order.side, asset, quote, order.quantity, order.price)?;

        let now = self.now();
        for other in self.orders.iter_mut() {
            if other.status != OrderStatus::New {
                continue;
            }
            if other.id == order.id {
                other.status = OrderStatus::Filled;
                other.updated_at = now;
            } else if order.group_id.is_some() && other.group_id == order.group_id {
                other.status = OrderStatus::Canceled;
                other.updated_at = now;
            }
        }

        tracing::info!(
            pair = %order.pair,
            id = order.id,
            side = %order.side,
            price = order.price,
            "paper order filled"
        );
        Ok(())
    }
}

fn assets(pair: &str) -> Result<(&str, &str), BrokerError> {
    split_pair(pair).ok_or_else(|| BrokerError::UnknownPair(pair.to_string()))
}

fn validate_quantity(size: f64) -> Result<(), BrokerError> {
    if size.is_finite() && size > 0.0 {
        Ok(())
    } else {
        Err(BrokerError::InvalidQuantity(size))
    }
}

/// In-memory simulated exchange
///
/// Market orders fill at the pair's last close. Resting orders (limit, stop,
/// OCO) lock their funds and fill when a later candle's range reaches their
/// price. Fed through [`CandleSubscriber`].
#[derive(Debug, Default)]
pub struct PaperBroker {
    wallet: Mutex<Wallet>,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit a free balance, e.g. the initial quote capital
    pub fn with_balance(mut self, asset: &str, amount: f64) -> Self {
        let wallet = self.wallet.get_mut().unwrap_or_else(PoisonError::into_inner);
        wallet.holdings.entry(asset.to_string()).or_default().free += amount;
        self
    }

    /// Realized P&L of every sell, in quote currency
    pub fn realized_pnls(&self) -> Vec<f64> {
        self.wallet
            .lock()
            .map(|w| w.realized.clone())
            .unwrap_or_default()
    }

    pub fn last_price(&self, pair: &str) -> Option<f64> {
        self.wallet
            .lock()
            .ok()
            .and_then(|w| w.last_price.get(pair).copied())
    }

    fn wallet(&self) -> Result<MutexGuard<'_, Wallet>, BrokerError> {
        self.wallet
            .lock()
            .map_err(|_| BrokerError::Unavailable("paper wallet lock poisoned".to_string()))
    }
}

impl Broker for PaperBroker {
    fn account(&self) -> Result<Account, BrokerError> {
        let wallet = self.wallet()?;
        let mut balances: Vec<Balance> = wallet
            .holdings
            .iter()
            .map(|(asset, h)| Balance {
                asset: asset.clone(),
                free: h.free,
                locked: h.locked,
            })
            .collect();
        balances.sort_by(|a, b| a.asset.cmp(&b.asset));

        Ok(Account { balances })
    }

    fn position(&self, pair: &str) -> Result<(f64, f64), BrokerError> {
        let (asset, quote) = assets(pair)?;
        let wallet = self.wallet()?;
        let a = wallet.holding(asset);
        let q = wallet.holding(quote);

        Ok((a.free + a.locked, q.free + q.locked))
    }

    fn order(&self, pair: &str, id: i64) -> Result<Order, BrokerError> {
        self.wallet()?
            .orders
            .iter()
            .find(|o| o.id == id && o.pair == pair)
            .cloned()
            .ok_or(BrokerError::OrderNotFound(id))
    }

    fn create_order_market(&self, side: Side, pair: &str, size: f64) -> Result<Order, BrokerError> {
        self.wallet()?.market(side, pair, size)
    }

    fn create_order_market_quote(
        &self,
        side: Side,
        pair: &str,
        quote: f64,
    ) -> Result<Order, BrokerError> {
        validate_quantity(quote)?;
        let mut wallet = self.wallet()?;
        let price = wallet.price(pair)?;
        wallet.market(side, pair, quote / price)
    }

    fn create_order_limit(
        &self,
        side: Side,
        pair: &str,
        size: f64,
        limit: f64,
    ) -> Result<Order, BrokerError> {
        validate_quantity(size)?;
        validate_quantity(limit)?;
        let (asset, quote) = assets(pair)?;
        let mut wallet = self.wallet()?;

        let id = wallet.next_id();
        match side {
            Side::Buy => wallet.lock(id, quote, size * limit)?,
            Side::Sell => wallet.lock(id, asset, size)?,
        }

        let order = wallet.draft(id, pair, side, OrderType::Limit, limit, size);
        wallet.orders.push(order.clone());
        Ok(order)
    }

    fn create_order_oco(
        &self,
        side: Side,
        pair: &str,
        size: f64,
        price: f64,
        stop: f64,
        stop_limit: f64,
    ) -> Result<Vec<Order>, BrokerError> {
        if side != Side::Sell {
            return Err(BrokerError::Rejected(
                "paper broker only supports sell OCO orders".to_string(),
            ));
        }
        validate_quantity(size)?;
        let (asset, _) = assets(pair)?;
        let mut wallet = self.wallet()?;

        let group = wallet.next_id();
        wallet.lock(group, asset, size)?;

        let limit_id = wallet.next_id();
        let mut limit_leg = wallet.draft(limit_id, pair, side, OrderType::LimitMaker, price, size);
        limit_leg.group_id = Some(group);

        let stop_id = wallet.next_id();
        let mut stop_leg = wallet.draft(stop_id, pair, side, OrderType::StopLoss, stop_limit, size);
        stop_leg.stop = Some(stop);
        stop_leg.group_id = Some(group);

        wallet.orders.push(limit_leg.clone());
        wallet.orders.push(stop_leg.clone());
        Ok(vec![limit_leg, stop_leg])
    }

    fn create_order_stop(&self, pair: &str, size: f64, limit: f64) -> Result<Order, BrokerError> {
        validate_quantity(size)?;
        validate_quantity(limit)?;
        let (asset, _) = assets(pair)?;
        let mut wallet = self.wallet()?;

        let id = wallet.next_id();
        wallet.lock(id, asset, size)?;

        let mut order = wallet.draft(id, pair, Side::Sell, OrderType::StopLoss, limit, size);
        order.stop = Some(limit);
        wallet.orders.push(order.clone());
        Ok(order)
    }

    fn cancel(&self, order: &Order) -> Result<(), BrokerError> {
        let mut wallet = self.wallet()?;
        let stored = wallet
            .orders
            .iter()
            .find(|o| o.id == order.id)
            .cloned()
            .ok_or(BrokerError::OrderNotFound(order.id))?;

        if stored.status != OrderStatus::New {
            return Err(BrokerError::Rejected(format!(
                "order {} is {:?}",
                stored.id, stored.status
            )));
        }

        let key = stored.group_id.unwrap_or(stored.id);
        wallet.release(key);

        let now = wallet.now();
        for o in wallet.orders.iter_mut() {
            if o.status == OrderStatus::New && o.group_id.unwrap_or(o.id) == key {
                o.status = OrderStatus::Canceled;
                o.updated_at = now;
            }
        }

        Ok(())
    }
}

impl CandleSubscriber for PaperBroker {
    fn on_candle(&self, candle: &Candle) {
        let mut wallet = self.wallet.lock().unwrap_or_else(PoisonError::into_inner);
        wallet.last_price.insert(candle.pair.clone(), candle.close);
        wallet.clock = Some(candle.time);

        for index in 0..wallet.orders.len() {
            let order = &wallet.orders[index];
            if order.status != OrderStatus::New || order.pair != candle.pair {
                continue;
            }

            let triggered = match (order.order_type, order.side) {
                (OrderType::StopLoss, _) => candle.low <= order.stop.unwrap_or(order.price),
                (_, Side::Buy) => candle.low <= order.price,
                (_, Side::Sell) => candle.high >= order.price,
            };

            if triggered {
                if let Err(err) = wallet.fill(index) {
                    tracing::warn!(id = wallet.orders[index].id, error = %err, "paper fill failed");
                    wallet.orders[index].status = OrderStatus::Rejected;
                }
            }
        }
    }
}
