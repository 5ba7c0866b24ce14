mod bind_fields_impl;

use proc_macro::TokenStream;
use proc_macro_error::proc_macro_error;

/// BindFields 派生宏
///
/// 为带有 `#[inject]` 的 `Autowired<T>` 字段生成 `BindFields` 实现，
/// 一般注入阶段按名称查找 Bean 并赋值。
///
/// 用法：
/// ```ignore
/// #[derive(BindFields)]
/// struct UserService {
///     #[inject("DB")]          // 注入名为 DB 的 Bean
///     db: Autowired<DbPool>,
///
///     #[inject]                // 不指定名称时使用字段名
///     mailer: Autowired<Mailer>,
///
///     retries: u32,            // 没有 #[inject] 的字段不参与绑定
/// }
/// ```
#[proc_macro_derive(BindFields, attributes(inject))]
#[proc_macro_error]
pub fn derive_bind_fields(input: TokenStream) -> TokenStream {
    bind_fields_impl::derive_bind_fields_impl(input)
}
