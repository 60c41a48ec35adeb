use paperclip::actix::web;

use crate::handlers;

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(handlers::health)))
        .service(web::resource("/covers/{name}").route(web::get().to(handlers::get_cover)))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/auth")
                        .service(web::resource("/sign_up").route(web::post().to(handlers::sign_up)))
                        .service(web::resource("/sign_in").route(web::post().to(handlers::sign_in)))
                        .service(
                            web::resource("/sign_out").route(web::post().to(handlers::sign_out)),
                        ),
                )
                .service(web::resource("/session").route(web::get().to(handlers::get_session)))
                .service(web::resource("/books").route(web::get().to(handlers::list_books)))
                .service(
                    web::scope("/book")
                        .service(web::resource("").route(web::post().to(handlers::add_book)))
                        .service(
                            web::resource("/{book_id}")
                                .route(web::get().to(handlers::get_book))
                                .route(web::patch().to(handlers::update_book))
                                .route(web::delete().to(handlers::delete_book)),
                        )
                        .service(
                            web::resource("/{book_id}/review")
                                .route(web::put().to(handlers::upsert_review)),
                        ),
                )
                .service(
                    web::resource("/review/{review_id}")
                        .route(web::delete().to(handlers::delete_review)),
                )
                .service(
                    web::resource("/profile/{user_id}")
                        .route(web::get().to(handlers::get_profile))
                        .route(web::patch().to(handlers::update_profile)),
                )
                .service(web::resource("/covers").route(web::post().to(handlers::upload_cover))),
        );
}
