//! [`Command`] definition.

pub mod add_to_cart;
pub mod adjust_stock;
pub mod authorize_session;
pub mod cancel_order;
pub mod clear_cart;
pub mod create_order;
pub mod delete_order;
pub mod mark_order_paid;
pub mod mark_order_payment_failed;
pub mod remove_from_cart;
pub mod return_order;
pub mod update_cart_line;
pub mod update_order_status;

/// [`Command`] of the [`Service`].
///
/// [`Service`]: crate::Service
pub use common::Handler as Command;

pub use self::{
    add_to_cart::AddToCart, adjust_stock::AdjustStock,
    authorize_session::AuthorizeSession, cancel_order::CancelOrder,
    clear_cart::ClearCart, create_order::CreateOrder,
    delete_order::DeleteOrder, mark_order_paid::MarkOrderPaid,
    mark_order_payment_failed::MarkOrderPaymentFailed,
    remove_from_cart::RemoveFromCart, return_order::ReturnOrder,
    update_cart_line::UpdateCartLine, update_order_status::UpdateOrderStatus,
};
