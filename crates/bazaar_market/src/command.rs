//! # Market Commands
//!
//! Hand-off from threads that do not own the [`Market`](crate::Market).
//! Producers enqueue trades through a [`CommandSender`]; the owning thread
//! executes them in FIFO order with `Market::drain_commands` and answers on
//! an optional per-command reply channel.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};

use crate::error::{MarketError, MarketResult};
use crate::item::CommodityId;
use crate::market::TradeOutcome;
use crate::ports::ActorId;
use crate::pricing::Side;

/// Receiving end of a command reply.
pub type Reply = Receiver<MarketResult<TradeOutcome>>;

/// Parameters of an enqueued trade.
#[derive(Debug)]
pub struct TradeRequest {
    /// Trading actor.
    pub actor: ActorId,
    /// Traded commodity.
    pub commodity: CommodityId,
    /// Requested units.
    pub units: u32,
    /// Where to send the outcome. `None` for fire-and-forget.
    pub reply: Option<Sender<MarketResult<TradeOutcome>>>,
}

/// A trade waiting for the market thread.
#[derive(Debug)]
pub enum MarketCommand {
    /// Buy from the market.
    Buy(TradeRequest),
    /// Sell to the market.
    Sell(TradeRequest),
}

impl MarketCommand {
    /// Direction of the trade.
    #[must_use]
    pub const fn side(&self) -> Side {
        match self {
            Self::Buy(_) => Side::Buy,
            Self::Sell(_) => Side::Sell,
        }
    }

    /// Consumes the command, returning its side and parameters.
    #[must_use]
    pub fn into_parts(self) -> (Side, TradeRequest) {
        match self {
            Self::Buy(request) => (Side::Buy, request),
            Self::Sell(request) => (Side::Sell, request),
        }
    }
}

/// Cloneable producer handle.
#[derive(Clone, Debug)]
pub struct CommandSender {
    sender: Sender<MarketCommand>,
}

impl CommandSender {
    /// Enqueues a buy and returns the channel its outcome arrives on.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::MarketClosed` if the market was dropped.
    pub fn buy(&self, actor: ActorId, commodity: CommodityId, units: u32) -> MarketResult<Reply> {
        self.request(Side::Buy, actor, commodity, units)
    }

    /// Enqueues a sell and returns the channel its outcome arrives on.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::MarketClosed` if the market was dropped.
    pub fn sell(&self, actor: ActorId, commodity: CommodityId, units: u32) -> MarketResult<Reply> {
        self.request(Side::Sell, actor, commodity, units)
    }

    /// Enqueues a prepared command.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::MarketClosed` if the market was dropped.
    pub fn submit(&self, command: MarketCommand) -> MarketResult<()> {
        self.sender
            .send(command)
            .map_err(|_| MarketError::MarketClosed)
    }

    fn request(
        &self,
        side: Side,
        actor: ActorId,
        commodity: CommodityId,
        units: u32,
    ) -> MarketResult<Reply> {
        let (reply, outcome) = bounded(1);
        let request = TradeRequest {
            actor,
            commodity,
            units,
            reply: Some(reply),
        };
        self.submit(match side {
            Side::Buy => MarketCommand::Buy(request),
            Side::Sell => MarketCommand::Sell(request),
        })?;
        Ok(outcome)
    }
}

/// Unbounded FIFO owned by the market.
#[derive(Debug)]
pub(crate) struct CommandQueue {
    sender: Sender<MarketCommand>,
    receiver: Receiver<MarketCommand>,
}

impl CommandQueue {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub(crate) fn sender(&self) -> CommandSender {
        CommandSender {
            sender: self.sender.clone(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.receiver.len()
    }

    pub(crate) fn try_next(&self) -> Option<MarketCommand> {
        match self.receiver.try_recv() {
            Ok(command) => Some(command),
            // The queue keeps its own sender, so it never disconnects.
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_arrive_in_order() {
        let queue = CommandQueue::new();
        let sender = queue.sender();
        let _first = sender.buy(1, 10, 5).unwrap();
        let _second = sender.sell(2, 11, 3).unwrap();
        assert_eq!(queue.len(), 2);

        let (side, request) = queue.try_next().unwrap().into_parts();
        assert_eq!(side, Side::Buy);
        assert_eq!((request.actor, request.commodity, request.units), (1, 10, 5));
        assert_eq!(queue.try_next().unwrap().side(), Side::Sell);
        assert!(queue.try_next().is_none());
    }

    #[test]
    fn test_sender_fails_after_queue_dropped() {
        let queue = CommandQueue::new();
        let sender = queue.sender();
        drop(queue);
        assert_eq!(sender.buy(1, 1, 1).err(), Some(MarketError::MarketClosed));
    }

    #[test]
    fn test_senders_across_threads() {
        let queue = CommandQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|actor| {
                let sender = queue.sender();
                std::thread::spawn(move || {
                    sender
                        .submit(MarketCommand::Sell(TradeRequest {
                            actor,
                            commodity: 1,
                            units: 1,
                            reply: None,
                        }))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 4);
    }
}
