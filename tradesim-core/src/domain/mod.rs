//! Domain types: bars, ticks, symbol specs, orders, positions, trades, account.

pub mod account;
pub mod bar;
pub mod ids;
pub mod order;
pub mod position;
pub mod symbol;
pub mod tick;
pub mod trade;

pub use account::AccountInfo;
pub use bar::Bar;
pub use ids::{Ticket, TicketGen};
pub use order::{
    expiration_from_epoch, OrderRequest, OrderType, PendingOrder, PendingOrderType, TradeAction,
};
pub use position::{Position, Side};
pub use symbol::{SymbolSpec, SymbolSpecError};
pub use tick::{QuoteModel, Tick};
pub use trade::{ClosedTrade, ExitReason};
