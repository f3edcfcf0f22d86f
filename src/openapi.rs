use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{entities, errors, handlers, services};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::orders::checkout,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::list_customer_orders,
        handlers::orders::update_order_status,
        handlers::orders::cancel_order,
        handlers::orders::retry_payment,
        handlers::orders::pay_with_wallet,
        handlers::payments::get_payment,
        handlers::payments::get_payment_status,
        handlers::callbacks::gateway_callback,
        handlers::wallets::create_wallet,
        handlers::wallets::get_wallet,
        handlers::wallets::deposit,
    ),
    components(schemas(
        errors::ErrorResponse,
        entities::order::Model,
        entities::order_item::Model,
        entities::payment::Model,
        entities::wallet::Model,
        entities::wallet_transaction::Model,
        services::checkout::CheckoutRequest,
        services::checkout::CheckoutLine,
        services::payments::CallbackAck,
        handlers::orders::UpdateOrderStatusRequest,
        handlers::orders::CancelOrderRequest,
        handlers::orders::RetryPaymentRequest,
        handlers::payments::PaymentStatusResponse,
        handlers::wallets::CreateWalletRequest,
        handlers::wallets::DepositRequest,
    )),
    tags(
        (name = "Orders", description = "Checkout and order lifecycle"),
        (name = "Payments", description = "Payment records and gateway callbacks"),
        (name = "Wallets", description = "Customer stored-balance accounts")
    ),
    info(
        title = "Storefront API",
        description = "Order checkout and payment reconciliation backend"
    )
)]
pub struct ApiDoc;

/// Swagger UI router serving the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
